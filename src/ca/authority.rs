//! Signing certificate requests.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use log::{debug, info, warn};
use openssl::asn1::Asn1Time;
use tokio::task::JoinHandle;

use super::{CaOptions, CaType, Error};
use crate::{
    commons::util::format_duration,
    pki::{KeyCertBundle, gen_cert_from_csr, parse_pem_encoded_csr, pem_encode_cert},
    probe::{FileController, Probe, ProbeOptions, ProbeStatus},
};

//------------ CertificateAuthority ------------------------------------------

/// Issues certificates for workloads and for the CA server itself.
///
/// All state is fixed at construction, so a single instance can be shared
/// between any number of threads or tasks, typically in an `Arc`.
#[derive(Debug)]
pub struct CertificateAuthority {
    ca_type: CaType,

    cert_ttl: Duration,
    max_cert_ttl: Duration,

    multicluster: bool,

    key_cert_bundle: KeyCertBundle,

    liveness_probe: Arc<Probe>,
    liveness_probe_options: Option<ProbeOptions>,
    probe_check_interval: Duration,
}

impl CertificateAuthority {
    pub fn new(opts: CaOptions) -> Result<Self, Error> {
        info!("Starting {} CA", opts.ca_type);

        Ok(CertificateAuthority {
            ca_type: opts.ca_type,
            cert_ttl: opts.cert_ttl,
            max_cert_ttl: opts.max_cert_ttl,
            multicluster: opts.multicluster,
            key_cert_bundle: opts.key_cert_bundle,
            liveness_probe: Arc::new(Probe::new()),
            liveness_probe_options: opts.liveness_probe,
            probe_check_interval: opts.probe_check_interval,
        })
    }

    /// Signs a PEM encoded CSR and returns the PEM encoded certificate.
    ///
    /// For a multicluster CA the certificate is a CA certificate (CA:TRUE
    /// in its basic constraints), otherwise it is a workload certificate.
    pub fn sign(&self, csr_pem: &[u8], ttl: Duration) -> Result<Bytes, Error> {
        self.sign_for(csr_pem, ttl, self.multicluster)
    }

    /// Signs the certificate for the CA server itself. This is never a CA
    /// certificate.
    pub fn sign_ca_server_cert(&self, csr_pem: &[u8], ttl: Duration) -> Result<Bytes, Error> {
        self.sign_for(csr_pem, ttl, false)
    }

    pub fn key_cert_bundle(&self) -> &KeyCertBundle {
        &self.key_cert_bundle
    }

    fn sign_for(&self, csr_pem: &[u8], ttl: Duration, for_ca: bool) -> Result<Bytes, Error> {
        let (signing_cert, signing_key) = self
            .key_cert_bundle
            .signing_pair()
            .ok_or(Error::NotReady)?;

        let csr = parse_pem_encoded_csr(csr_pem).map_err(Error::InvalidCsr)?;

        if ttl.as_secs_f64() > self.max_cert_ttl.as_secs_f64() {
            return Err(Error::TtlExceeded {
                requested: ttl,
                max: self.max_cert_ttl,
            });
        }

        let public_key = csr
            .public_key()
            .map_err(|e| Error::InvalidCsr(e.into()))?;
        let der = gen_cert_from_csr(&csr, signing_cert, &public_key, signing_key, ttl, for_ca)
            .map_err(Error::Signing)?;

        debug!(
            "Signed {} certificate valid for {}",
            if for_ca { "CA" } else { "workload" },
            format_duration(ttl)
        );

        Ok(pem_encode_cert(&der))
    }
}

/// # Settings
impl CertificateAuthority {
    pub fn ca_type(&self) -> &CaType {
        &self.ca_type
    }

    /// The default TTL for issued certificates.
    pub fn cert_ttl(&self) -> Duration {
        self.cert_ttl
    }

    pub fn max_cert_ttl(&self) -> Duration {
        self.max_cert_ttl
    }

    pub fn multicluster(&self) -> bool {
        self.multicluster
    }
}

/// # Liveness
impl CertificateAuthority {
    pub fn liveness_probe(&self) -> &Arc<Probe> {
        &self.liveness_probe
    }

    /// Checks whether the CA can sign, reports it to the liveness probe and
    /// returns the new status.
    pub fn check_liveness(&self) -> ProbeStatus {
        let res = self.usable();
        if let Err(reason) = &res {
            warn!("CA liveness check failed: {}", reason);
        }
        self.liveness_probe.set_available(res);
        self.liveness_probe.status()
    }

    /// Starts publishing liveness to a file, if the CA has valid probe
    /// options.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_liveness_controller(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let options = self.liveness_probe_options.clone()?;
        if !options.is_valid() || self.probe_check_interval.is_zero() {
            warn!(
                "Not reporting CA liveness, invalid probe options for '{}'",
                options.path.to_string_lossy()
            );
            return None;
        }
        info!(
            "Reporting CA liveness to '{}' every {}",
            options.path.to_string_lossy(),
            format_duration(options.update_interval)
        );

        let controller = FileController::new(options, self.liveness_probe.clone());
        let ca = self.clone();
        Some(controller.spawn(self.probe_check_interval, move || {
            ca.check_liveness();
        }))
    }

    fn usable(&self) -> Result<(), String> {
        let cert = self
            .key_cert_bundle
            .signing_cert()
            .ok_or_else(|| Error::NotReady.to_string())?;

        let now = Asn1Time::days_from_now(0).map_err(|e| e.to_string())?;
        let left = now.diff(cert.not_after()).map_err(|e| e.to_string())?;
        if left.days < 0 || left.secs < 0 {
            Err("CA signing certificate has expired".to_string())
        } else {
            Ok(())
        }
    }
}

//------------ Tests ---------------------------------------------------------
