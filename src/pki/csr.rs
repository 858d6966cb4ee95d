//! Parsing of certificate signing requests.

use openssl::x509::X509Req;

use super::Error;

/// Parses a PEM encoded PKCS#10 certificate signing request.
///
/// The request must carry a valid self-signature, proving possession of
/// the private key for the public key it contains.
pub fn parse_pem_encoded_csr(csr_pem: &[u8]) -> Result<X509Req, Error> {
    if csr_pem.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::invalid_csr("no PEM data found"));
    }

    let csr = X509Req::from_pem(csr_pem).map_err(Error::invalid_csr)?;

    let public_key = csr.public_key().map_err(Error::invalid_csr)?;
    if !csr.verify(&public_key).map_err(Error::invalid_csr)? {
        return Err(Error::invalid_csr("signature does not verify"));
    }

    Ok(csr)
}

//------------ Tests ---------------------------------------------------------
