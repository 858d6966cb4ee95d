//! Bootstrapping a CA from configuration and signing with it.

use std::time::Duration;

use bytes::Bytes;
use openssl::{
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    rsa::Rsa,
    stack::Stack,
    x509::{
        X509, X509NameBuilder, X509ReqBuilder, X509StoreContext, store::X509StoreBuilder,
    },
};

use meshca::{
    ca,
    commons::util::file,
    config::Config,
    constants::{CA_CERT_ID, CA_PRIVATE_KEY_ID, CA_SECRET_NAME, CA_SECRET_TYPE},
    daemon,
    pki::{CertOptions, Issuer, gen_cert_key_from_options},
    secrets::{DiskStore, SecretStore},
};

fn csr(common_name: &str) -> Bytes {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
    let name = name.build();

    let mut req = X509ReqBuilder::new().unwrap();
    req.set_subject_name(&name).unwrap();
    req.set_pubkey(&key).unwrap();
    req.sign(&key, MessageDigest::sha256()).unwrap();
    Bytes::from(req.build().to_pem().unwrap())
}

fn ca_cert(org: &str, signer: Option<Issuer>) -> (Bytes, Bytes) {
    gen_cert_key_from_options(&CertOptions {
        ttl: Duration::from_secs(24 * 3600),
        org: org.to_string(),
        is_ca: true,
        is_self_signed: signer.is_none(),
        rsa_key_size: 2048,
        signer,
    })
    .unwrap()
}

fn verifies(leaf: &X509, chain: &[&[u8]], root: &[u8]) -> bool {
    let mut store = X509StoreBuilder::new().unwrap();
    store.add_cert(X509::from_pem(root).unwrap()).unwrap();
    let store = store.build();

    let mut intermediates = Stack::new().unwrap();
    for pem in chain {
        intermediates.push(X509::from_pem(pem).unwrap()).unwrap();
    }

    let mut ctx = X509StoreContext::new().unwrap();
    ctx.init(&store, leaf, &intermediates, |c| c.verify_cert())
        .unwrap()
}

#[test]
fn self_signed_root_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::parse(&format!(
        "storage_uri = \"{}\"\nnamespace = \"mesh-system\"\nmax_cert_ttl_seconds = 86400",
        dir.path().join("data").display()
    ))
    .unwrap();
    config.verify().unwrap();

    let first = daemon::bootstrap(&config).unwrap();
    let root = first.key_cert_bundle().root_cert_pem().unwrap().clone();

    let stored = DiskStore::new(dir.path().join("data"))
        .get("mesh-system", CA_SECRET_NAME)
        .unwrap();
    assert_eq!(stored.secret_type, CA_SECRET_TYPE);
    assert_eq!(stored.get(CA_CERT_ID), Some(&root));
    assert!(stored.get(CA_PRIVATE_KEY_ID).is_some());

    let second = daemon::bootstrap(&config).unwrap();
    assert_eq!(second.key_cert_bundle().root_cert_pem(), Some(&root));

    // certificates from the restarted CA chain to the stored root
    let pem = second.sign(&csr("workload"), Duration::from_secs(3600)).unwrap();
    let cert = X509::from_pem(&pem).unwrap();
    assert!(verifies(&cert, &[], &root));

    let err = second
        .sign(&csr("workload"), Duration::from_secs(2 * 86400))
        .unwrap_err();
    assert!(matches!(err, ca::Error::TtlExceeded { .. }));
    assert_eq!(
        err.to_string(),
        "requested TTL 48h0m0s is greater than the max allowed TTL 24h0m0s"
    );
}

#[test]
fn plugged_cert_chain() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();

    let (root_cert, root_key) = ca_cert("root", None);
    let root = Issuer::from_pem(&root_cert, &root_key).unwrap();
    let (inter_cert, inter_key) = ca_cert("intermediate", Some(root));
    let inter = Issuer::from_pem(&inter_cert, &inter_key).unwrap();
    let (signing_cert, signing_key) = ca_cert("signing", Some(inter));

    file::save(&root_cert, &d.join("root-cert.pem")).unwrap();
    file::save(&inter_cert, &d.join("cert-chain.pem")).unwrap();
    file::save(&signing_cert, &d.join("ca-cert.pem")).unwrap();
    file::save(&signing_key, &d.join("ca-key.pem")).unwrap();

    let config = Config::parse(&format!(
        "storage_uri = \"memory:\"\nca_mode = \"plugged\"\nmulticluster = true\n\
         signing_cert = \"{0}/ca-cert.pem\"\nsigning_key = \"{0}/ca-key.pem\"\n\
         root_cert = \"{0}/root-cert.pem\"\ncert_chain = \"{0}/cert-chain.pem\"",
        d.display()
    ))
    .unwrap();
    config.verify().unwrap();

    let ca = daemon::bootstrap(&config).unwrap();
    assert!(ca.multicluster());
    assert_eq!(ca.key_cert_bundle().cert_chain_pem(), Some(&inter_cert));

    let pem = ca.sign(&csr("cluster-b"), Duration::from_secs(600)).unwrap();
    let cert = X509::from_pem(&pem).unwrap();
    assert!(verifies(&cert, &[&signing_cert, &inter_cert], &root_cert));
    let text = String::from_utf8(cert.to_text().unwrap()).unwrap();
    assert!(text.contains("CA:TRUE"));

    let pem = ca
        .sign_ca_server_cert(&csr("meshca"), Duration::from_secs(600))
        .unwrap();
    let cert = X509::from_pem(&pem).unwrap();
    let text = String::from_utf8(cert.to_text().unwrap()).unwrap();
    assert!(text.contains("CA:FALSE"));
}

#[test]
fn plugged_cert_with_wrong_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();

    let (root_cert, _) = ca_cert("root", None);
    let (_, other_key) = ca_cert("other", None);
    file::save(&root_cert, &d.join("root-cert.pem")).unwrap();
    file::save(&other_key, &d.join("ca-key.pem")).unwrap();

    let config = Config::parse(&format!(
        "ca_mode = \"plugged\"\nsigning_cert = \"{0}/root-cert.pem\"\n\
         signing_key = \"{0}/ca-key.pem\"\nroot_cert = \"{0}/root-cert.pem\"",
        d.display()
    ))
    .unwrap();

    let err = daemon::bootstrap(&config).err().unwrap();
    assert!(err.to_string().starts_with("failed to create CA KeyCertBundle"));
}
