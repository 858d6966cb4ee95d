//! Generation of keys and certificates.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::Utc;
use openssl::{
    asn1::{Asn1Integer, Asn1Time},
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    nid::Nid,
    pkey::{HasPublic, PKey, PKeyRef, Private, Public},
    rsa::Rsa,
    x509::{
        X509, X509Builder, X509NameBuilder, X509NameRef, X509Ref, X509ReqRef,
        extension::{
            AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
            SubjectKeyIdentifier,
        },
    },
};

use super::Error;
use crate::constants::PEM_CERTIFICATE_LABEL;

const SERIAL_NUMBER_BITS: i32 = 128;

//------------ CertOptions ---------------------------------------------------

/// Options for generating a new key pair with a certificate.
#[derive(Clone, Debug)]
pub struct CertOptions {
    /// How long the certificate is valid, starting now.
    pub ttl: Duration,

    /// The organization in the certificate subject. Left out if empty.
    pub org: String,

    /// Whether the certificate may sign other certificates.
    pub is_ca: bool,

    /// Whether the certificate is signed with its own key.
    pub is_self_signed: bool,

    pub rsa_key_size: u32,

    /// The issuer, required if `is_self_signed` is false.
    pub signer: Option<Issuer>,
}

/// A certificate with its private key, used to sign other certificates.
#[derive(Clone, Debug)]
pub struct Issuer {
    pub cert: X509,
    pub key: PKey<Private>,
}

impl Issuer {
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, Error> {
        let cert = X509::from_pem(cert_pem).map_err(Error::invalid_pem)?;
        let key = PKey::private_key_from_pem(key_pem).map_err(Error::invalid_pem)?;
        Ok(Issuer { cert, key })
    }
}

//------------ Generating ----------------------------------------------------

/// Generates a new RSA key and a certificate for it.
///
/// Returns the PEM encoded certificate and PKCS#8 private key.
pub fn gen_cert_key_from_options(
    options: &CertOptions,
) -> Result<(Bytes, Bytes), Error> {
    if options.rsa_key_size == 0 {
        return Err(Error::Options("RSA key size must be set".to_string()));
    }

    let issuer = match (options.is_self_signed, options.signer.as_ref()) {
        (true, _) => None,
        (false, Some(issuer)) => Some(issuer),
        (false, None) => {
            return Err(Error::Options(
                "a signer is needed for a certificate that is not self-signed"
                    .to_string(),
            ));
        }
    };

    let key = PKey::from_rsa(Rsa::generate(options.rsa_key_size)?)?;

    let mut name = X509NameBuilder::new()?;
    if !options.org.is_empty() {
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, &options.org)?;
    }
    let name = name.build();

    let mut builder = cert_builder(&name, &key, options.ttl, options.is_ca)?;
    match issuer {
        None => {
            builder.set_issuer_name(&name)?;
            add_key_identifiers(&mut builder, None)?;
            builder.sign(&key, MessageDigest::sha256())?;
        }
        Some(issuer) => {
            builder.set_issuer_name(issuer.cert.subject_name())?;
            add_key_identifiers(&mut builder, Some(&issuer.cert))?;
            builder.sign(&issuer.key, MessageDigest::sha256())?;
        }
    }
    let cert = builder.build();

    Ok((
        Bytes::from(cert.to_pem()?),
        Bytes::from(key.private_key_to_pem_pkcs8()?),
    ))
}

/// Issues a DER encoded certificate for the subject of a CSR.
///
/// Only the subject name is taken from the request, the extensions are
/// decided here: a CA certificate may sign certificates, anything else
/// gets a TLS client and server identity.
pub fn gen_cert_from_csr(
    csr: &X509ReqRef,
    signing_cert: &X509Ref,
    public_key: &PKeyRef<Public>,
    signing_key: &PKeyRef<Private>,
    ttl: Duration,
    is_ca: bool,
) -> Result<Vec<u8>, Error> {
    let mut builder = cert_builder(csr.subject_name(), public_key, ttl, is_ca)?;
    builder.set_issuer_name(signing_cert.subject_name())?;
    add_key_identifiers(&mut builder, Some(signing_cert))?;
    builder.sign(signing_key, MessageDigest::sha256())?;

    Ok(builder.build().to_der()?)
}

/// PEM encodes DER certificate bytes.
pub fn pem_encode_cert(der: &[u8]) -> Bytes {
    let encoded = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {}-----\n", PEM_CERTIFICATE_LABEL);
    for line in encoded.as_bytes().chunks(64) {
        // base64 output is ascii
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", PEM_CERTIFICATE_LABEL));
    Bytes::from(pem)
}

fn cert_builder<T: HasPublic>(
    subject: &X509NameRef,
    public_key: &PKeyRef<T>,
    ttl: Duration,
    is_ca: bool,
) -> Result<X509Builder, Error> {
    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let serial = serial_number()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(subject)?;
    builder.set_pubkey(public_key)?;

    let (not_before, not_after) = validity(ttl)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    if is_ca {
        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.append_extension(
            KeyUsage::new().critical().key_cert_sign().crl_sign().build()?,
        )?;
    } else {
        builder.append_extension(BasicConstraints::new().critical().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        builder.append_extension(
            ExtendedKeyUsage::new().server_auth().client_auth().build()?,
        )?;
    }

    Ok(builder)
}

/// Adds the subject and authority key identifiers.
///
/// Without an issuer the certificate is taken to be self-signed.
fn add_key_identifiers(
    builder: &mut X509Builder,
    issuer: Option<&X509Ref>,
) -> Result<(), Error> {
    let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(issuer, None))?;
    builder.append_extension(ski)?;

    let aki = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(issuer, None))?;
    builder.append_extension(aki)?;

    Ok(())
}

fn serial_number() -> Result<Asn1Integer, Error> {
    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_NUMBER_BITS, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial.to_asn1_integer()?)
}

fn validity(ttl: Duration) -> Result<(Asn1Time, Asn1Time), Error> {
    let now = Utc::now().timestamp();
    let not_after = i64::try_from(ttl.as_secs())
        .ok()
        .and_then(|secs| now.checked_add(secs))
        .ok_or_else(|| Error::Options(format!("TTL of {:?} is too large", ttl)))?;

    Ok((Asn1Time::from_unix(now)?, Asn1Time::from_unix(not_after)?))
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pki::parse_pem_encoded_csr, test};

    #[test]
    fn self_signed_ca_cert() {
        let options = CertOptions {
            ttl: Duration::from_secs(3600),
            org: "example.org".to_string(),
            is_ca: true,
            is_self_signed: true,
            rsa_key_size: 2048,
            signer: None,
        };
        let (cert_pem, key_pem) = gen_cert_key_from_options(&options).unwrap();

        let cert = X509::from_pem(&cert_pem).unwrap();
        let key = PKey::private_key_from_pem(&key_pem).unwrap();

        assert!(cert.public_key().unwrap().public_eq(&key));
        assert!(cert.verify(&key).unwrap());
        assert!(test::is_ca_cert(&cert));
        assert_eq!(test::validity_secs(&cert), 3600);

        let org = cert
            .subject_name()
            .entries_by_nid(Nid::ORGANIZATIONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string();
        assert_eq!(org, "example.org");
    }

    #[test]
    fn issued_by_signer() {
        let root = test::self_signed_root();
        let options = CertOptions {
            ttl: Duration::from_secs(600),
            org: "intermediate".to_string(),
            is_ca: true,
            is_self_signed: false,
            rsa_key_size: 2048,
            signer: Some(root.issuer()),
        };
        let (cert_pem, _) = gen_cert_key_from_options(&options).unwrap();
        let cert = X509::from_pem(&cert_pem).unwrap();

        assert!(cert.verify(&root.key).unwrap());
        assert_eq!(
            cert.issuer_name().to_der().unwrap(),
            root.cert.subject_name().to_der().unwrap()
        );
    }

    #[test]
    fn not_self_signed_needs_signer() {
        let options = CertOptions {
            ttl: Duration::from_secs(600),
            org: String::new(),
            is_ca: false,
            is_self_signed: false,
            rsa_key_size: 2048,
            signer: None,
        };
        assert!(matches!(
            gen_cert_key_from_options(&options),
            Err(Error::Options(_))
        ));
    }

    #[test]
    fn leaf_from_csr() {
        let root = test::self_signed_root();
        let (csr_pem, csr_key) = test::gen_csr("workload");
        let csr = parse_pem_encoded_csr(&csr_pem).unwrap();
        let public_key = csr.public_key().unwrap();

        let der = gen_cert_from_csr(
            &csr,
            &root.cert,
            &public_key,
            &root.key,
            Duration::from_secs(3600),
            false,
        )
        .unwrap();

        let cert = X509::from_der(&der).unwrap();
        assert!(cert.verify(&root.key).unwrap());
        assert!(cert.public_key().unwrap().public_eq(&csr_key));
        assert!(!test::is_ca_cert(&cert));
        assert_eq!(test::common_name(&cert), "workload");
        assert_eq!(test::validity_secs(&cert), 3600);
    }

    #[test]
    fn pem_encoding_parses_back() {
        let root = test::self_signed_root();
        let der = root.cert.to_der().unwrap();

        let pem = pem_encode_cert(&der);
        assert!(pem.starts_with(b"-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.ends_with(b"-----END CERTIFICATE-----\n"));
        assert_eq!(X509::from_pem(&pem).unwrap().to_der().unwrap(), der);
    }

    #[test]
    fn serial_numbers_differ() {
        let root = test::self_signed_root();
        let (csr_pem, _) = test::gen_csr("workload");
        let csr = parse_pem_encoded_csr(&csr_pem).unwrap();
        let public_key = csr.public_key().unwrap();

        let serial = || {
            let der = gen_cert_from_csr(
                &csr,
                &root.cert,
                &public_key,
                &root.key,
                Duration::from_secs(60),
                false,
            )
            .unwrap();
            X509::from_der(&der).unwrap().serial_number().to_bn().unwrap()
        };

        assert_ne!(serial(), serial());
    }
}
