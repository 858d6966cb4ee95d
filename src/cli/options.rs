//! The options for the `meshca` command.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use log::info;

use super::Error;
use crate::{
    commons::util::{file, format_duration},
    config::Config,
    constants::{MESHCA_DEFAULT_CONFIG_FILE, MESHCA_ENV_CONFIG},
    daemon,
    probe,
};

//------------ Options -------------------------------------------------------

/// The command line options for meshca.
#[derive(clap::Parser)]
#[command(
    version,
    about = "A certificate authority for service mesh workload identities.",
)]
pub struct Options {
    /// The path to the config file.
    #[arg(
        short, long,
        env = MESHCA_ENV_CONFIG,
        default_value = MESHCA_DEFAULT_CONFIG_FILE,
        global = true,
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

impl Options {
    /// Creates the options from the process arguments.
    ///
    /// If the arguments won’t result in usable options, exits the process.
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn run(self) -> Result<(), Error> {
        match self.command {
            Command::Server(cmd) => cmd.run(load_config(self.config)?),
            Command::Sign(cmd) => cmd.run(&load_config(self.config)?),
            Command::Root(cmd) => cmd.run(&load_config(self.config)?),
            Command::Config(cmd) => cmd.run(),
            Command::Probe(cmd) => cmd.run(),
        }
    }
}

fn load_config(path: PathBuf) -> Result<Config, Error> {
    Config::create(&path).map_err(|e| Error::Daemon(daemon::Error::Config(e)))
}

//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// Start the CA and keep it running until interrupted.
    Server(Server),

    /// Sign a certificate signing request.
    Sign(Sign),

    /// Print the root certificate of the CA.
    Root(Root),

    /// Print a default configuration file.
    Config(PrintConfig),

    /// Check that a liveness file is fresh.
    Probe(Probe),
}

//------------ Server --------------------------------------------------------

#[derive(clap::Args)]
pub struct Server {}

impl Server {
    pub fn run(self, config: Config) -> Result<(), Error> {
        Ok(daemon::start(config)?)
    }
}

//------------ Sign ----------------------------------------------------------

#[derive(clap::Args)]
pub struct Sign {
    /// The PEM encoded certificate signing request.
    #[arg(long, value_name = "file")]
    pub csr: PathBuf,

    /// The validity in seconds, defaults to cert_ttl_seconds from the config.
    #[arg(long, value_name = "seconds")]
    pub ttl: Option<u64>,

    /// Sign the certificate for the CA server itself.
    #[arg(long)]
    pub ca_server: bool,

    /// Write the certificate to this file instead of stdout.
    #[arg(long, value_name = "file")]
    pub out: Option<PathBuf>,
}

impl Sign {
    pub fn run(self, config: &Config) -> Result<(), Error> {
        let ca = daemon::bootstrap(config)?;

        let csr = file::read(&self.csr)?;
        let ttl = self
            .ttl
            .map(Duration::from_secs)
            .unwrap_or_else(|| ca.cert_ttl());

        let pem = if self.ca_server {
            ca.sign_ca_server_cert(&csr, ttl)?
        } else {
            ca.sign(&csr, ttl)?
        };
        info!("Issued certificate valid for {}", format_duration(ttl));

        match self.out {
            Some(path) => file::save(&pem, &path)?,
            None => print!("{}", String::from_utf8_lossy(&pem)),
        }
        Ok(())
    }
}

//------------ Root ----------------------------------------------------------

#[derive(clap::Args)]
pub struct Root {}

impl Root {
    pub fn run(self, config: &Config) -> Result<(), Error> {
        let ca = daemon::bootstrap(config)?;
        if let Some(pem) = ca.key_cert_bundle().root_cert_pem() {
            print!("{}", String::from_utf8_lossy(pem));
        }
        Ok(())
    }
}

//------------ PrintConfig ---------------------------------------------------

#[derive(clap::Args)]
pub struct PrintConfig {}

impl PrintConfig {
    pub fn run(self) -> Result<(), Error> {
        print!("{}", Config::default_file());
        Ok(())
    }
}

//------------ Probe ---------------------------------------------------------

#[derive(clap::Args)]
pub struct Probe {
    /// The liveness file kept by the server.
    #[arg(long, value_name = "file")]
    pub path: PathBuf,

    /// The most seconds since the last update of the file.
    #[arg(long, value_name = "seconds", default_value_t = 30)]
    pub interval: u64,
}

impl Probe {
    pub fn run(self) -> Result<(), Error> {
        probe::check_file(&self.path, Duration::from_secs(self.interval))?;
        Ok(())
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use openssl::x509::X509;

    use super::*;
    use crate::test;

    fn parse(args: &[&str]) -> Options {
        Options::try_parse_from(args).unwrap()
    }

    #[test]
    fn parse_sign() {
        let options = parse(&[
            "meshca", "--config", "/tmp/meshca.conf", "sign", "--csr", "req.pem", "--ttl", "600",
            "--ca-server",
        ]);
        assert_eq!(options.config, PathBuf::from("/tmp/meshca.conf"));
        match options.command {
            Command::Sign(sign) => {
                assert_eq!(sign.csr, PathBuf::from("req.pem"));
                assert_eq!(sign.ttl, Some(600));
                assert!(sign.ca_server);
                assert!(sign.out.is_none());
            }
            _ => panic!("expected sign"),
        }
    }

    #[test]
    fn parse_defaults() {
        let options = parse(&["meshca", "probe", "--path", "/tmp/live"]);
        match options.command {
            Command::Probe(probe) => assert_eq!(probe.interval, 30),
            _ => panic!("expected probe"),
        }

        assert!(Options::try_parse_from(["meshca", "sign"]).is_err());
        assert!(Options::try_parse_from(["meshca"]).is_err());
    }

    #[test]
    fn sign_to_file() {
        test::test_under_tmp(|d| {
            let config = Config::parse(&format!(
                "storage_uri = \"local://{}\"\nmax_cert_ttl_seconds = 3600",
                d.join("data").display()
            ))
            .unwrap();

            let (csr, _) = test::gen_csr("workload");
            let csr_path = d.join("req.pem");
            file::save(&csr, &csr_path).unwrap();

            let out = d.join("cert.pem");
            Sign {
                csr: csr_path.clone(),
                ttl: None,
                ca_server: false,
                out: Some(out.clone()),
            }
            .run(&config)
            .unwrap();

            let cert = X509::from_pem(&file::read(&out).unwrap()).unwrap();
            assert_eq!(test::common_name(&cert), "workload");
            assert_eq!(test::validity_secs(&cert), 3600);

            let res = Sign {
                csr: csr_path,
                ttl: Some(7200),
                ca_server: false,
                out: Some(d.join("too-long.pem")),
            }
            .run(&config);
            assert!(matches!(res, Err(Error::Ca(_))));
        });
    }

    #[test]
    fn probe_missing_file() {
        test::test_under_tmp(|d| {
            let res = Probe {
                path: d.join("liveness"),
                interval: 30,
            }
            .run();
            assert!(matches!(res, Err(Error::Probe(_))));
        });
    }
}
