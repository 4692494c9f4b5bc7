use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{CommandFactory, Parser};

use nrfcred::credential::CredentialInputs;
use nrfcred::{Error, NrfjprogDll, Request, Target};

#[derive(clap::Parser)]
#[command(
    name = "nrfcred",
    version,
    about = "A command line interface for managing nRF91 credentials via SWD.",
    after_help = "WARNING: nrf_cloud relies on credentials with sec_tag 16842753."
)]
struct Cli {
    /// Read existing hex file instead of generating a new one
    #[arg(short, long, value_name = "PATH_TO_IN_FILE")]
    in_file: Option<PathBuf>,
    /// Write output to file instead of programming it
    #[arg(short, long, value_name = "PATH_TO_OUT_FILE")]
    out_file: Option<PathBuf>,
    /// Delay in seconds to allow firmware on nRF91 to execute (0 uses the default)
    #[arg(short = 'd', long, value_name = "FW_EXECUTE_DELAY")]
    fw_delay: Option<u64>,
    /// Serial number of J-Link
    #[arg(short, long, value_name = "JLINK_SERIAL_NUMBER")]
    serial_number: Option<u32>,
    /// sec_tag to use for credential
    #[arg(long)]
    sec_tag: Option<u32>,
    /// Add a preshared key (PSK) as a string
    #[arg(long, value_name = "PRESHARED_KEY")]
    psk: Option<String>,
    /// Add a preshared key (PSK) identity as a string
    #[arg(long, value_name = "PRESHARED_KEY_IDENTITY")]
    psk_ident: Option<String>,
    /// Path to a root Certificate Authority certificate
    #[arg(long, value_name = "CA_CERT_PATH")]
    ca_cert_path: Option<PathBuf>,
    /// Path to a client certificate
    #[arg(long, value_name = "CLIENT_CERT_PATH")]
    client_cert_path: Option<PathBuf>,
    /// Path to a client private key
    #[arg(long, value_name = "CLIENT_PRIVATE_KEY_PATH")]
    client_private_key_path: Option<PathBuf>,
    /// Path to nrfjprogdll, if it is not on the library search path
    #[arg(long, value_name = "PATH")]
    nrfjprog_dll: Option<PathBuf>,
    /// Target profile (YAML) to use instead of the builtin nRF91 one
    #[arg(long, value_name = "PATH")]
    target: Option<PathBuf>,
    /// Turn debug logging on
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn request(&self) -> Request {
        Request {
            in_file: self.in_file.clone(),
            out_file: self.out_file.clone(),
            fw_delay: self.fw_delay.map(Duration::from_secs),
            serial_number: self.serial_number,
            sec_tag: self.sec_tag,
            credentials: CredentialInputs {
                psk: self.psk.clone(),
                psk_ident: self.psk_ident.clone(),
                ca_cert_path: self.ca_cert_path.clone(),
                client_cert_path: self.client_cert_path.clone(),
                client_private_key_path: self.client_private_key_path.clone(),
            },
        }
    }
}

fn run(cli: &Cli) -> nrfcred::Result<()> {
    let config = cli.request().validate()?;
    let target = match &cli.target {
        Some(path) => Target::load(path)?,
        None => Target::builtin()?,
    };

    let summary = nrfcred::session::run(&config, &target, || {
        NrfjprogDll::open(cli.nrfjprog_dll.as_deref(), &target)
    })?;
    log::info!(
        "Added {} credential(s), block now holds {}",
        summary.added,
        summary.total
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = simplelog::TermLogger::init(
        if cli.verbose {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Configuration(_)) {
                eprintln!("{}", Cli::command().render_usage());
            }
            eprintln!("error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
