//! Command line front end for Seedkeeper/Satochip cards
//!
//! Usage: seedkeeper-tool [--simulator seedkeeper] --pin 1234 list

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, error, info};

use seedkeeper_tool::card::CardType;
use seedkeeper_tool::protocol::CardTransport;
use seedkeeper_tool::secret::mnemonic;
use seedkeeper_tool::sim::{CardState, VirtualCard};
use seedkeeper_tool::error::NotSuitable;
use seedkeeper_tool::{logging, Config, Controller, Error, ErrorKind, Feature, Pin, SecretPayload, SeedPolicy};

#[derive(Parser, Debug)]
#[command(author, version, about = "Manage secrets on Satochip and Seedkeeper cards")]
struct Cli {
    /// Use a virtual card persisted in the data directory instead of a reader
    #[arg(long, value_enum)]
    simulator: Option<SimulatedCard>,

    /// Directory holding the virtual card state
    #[arg(long, value_name = "PATH", env = "SEEDKEEPER_SIM_DIR")]
    sim_dir: Option<PathBuf>,

    /// Use the first reader whose name contains this text
    #[arg(long, value_name = "NAME")]
    reader: Option<String>,

    /// Card PIN
    #[arg(long, env = "SEEDKEEPER_PIN", hide_env_values = true)]
    pin: Option<String>,

    /// JSON configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum SimulatedCard {
    Seedkeeper,
    SeedkeeperV1,
    Satochip,
}

impl SimulatedCard {
    fn blank_state(self) -> CardState {
        match self {
            SimulatedCard::Seedkeeper => CardState::blank(CardType::Seedkeeper, 0, 2),
            SimulatedCard::SeedkeeperV1 => CardState::blank(CardType::Seedkeeper, 0, 1),
            SimulatedCard::Satochip => CardState::blank(CardType::Satochip, 0, 12),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show card status (and storage counters when the PIN is given).
    Status,
    /// List secret headers.
    List,
    /// Print one secret, including its plaintext.
    Show { id: u16 },
    /// Store a BIP39 mnemonic.
    ImportMnemonic(ImportMnemonicArgs),
    /// Store a login/password pair.
    ImportPassword(ImportPasswordArgs),
    /// Store free text (Seedkeeper V2).
    ImportText {
        #[arg(long)]
        label: String,
        #[arg(long)]
        text: String,
    },
    /// Store a wallet descriptor (Seedkeeper V2).
    ImportDescriptor {
        #[arg(long)]
        label: String,
        #[arg(long)]
        descriptor: String,
    },
    /// Generate a BIP39 mnemonic on this computer; the card is not used.
    GenerateSeed {
        #[arg(long, default_value_t = 12)]
        words: usize,
    },
    /// Erase a secret (Seedkeeper V2).
    Erase { id: u16 },
    /// Change the card PIN.
    ChangePin(ChangePinArgs),
    /// Show the card label, or set it when a value is given.
    Label { new_label: Option<String> },
    /// Print the card audit log.
    Logs,
    /// Write a JSON backup of card metadata.
    Backup(BackupArgs),
    /// Set up a blank card.
    Init(InitArgs),
}

#[derive(Args, Debug, Clone)]
struct ImportMnemonicArgs {
    #[arg(long)]
    label: String,
    /// Space separated words
    #[arg(long)]
    words: String,
    #[arg(long)]
    passphrase: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct ImportPasswordArgs {
    #[arg(long)]
    label: String,
    #[arg(long)]
    login: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    url: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct ChangePinArgs {
    #[arg(long, env = "SEEDKEEPER_NEW_PIN", hide_env_values = true)]
    new_pin: String,
    /// Repeat of the new PIN
    #[arg(long)]
    confirm_pin: String,
}

#[derive(Args, Debug, Clone)]
struct BackupArgs {
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
    /// Include the plaintext of these secret ids
    #[arg(long = "include", value_name = "ID")]
    include: Vec<u16>,
}

#[derive(Args, Debug, Clone)]
struct InitArgs {
    /// Repeat of --pin
    #[arg(long)]
    confirm_pin: String,
    /// Have the Seedkeeper generate a masterseed of this many bytes
    #[arg(long, value_name = "BYTES", conflicts_with = "mnemonic")]
    generate: Option<u8>,
    /// Seed the card from this BIP39 mnemonic
    #[arg(long)]
    mnemonic: Option<String>,
    #[arg(long, requires = "mnemonic")]
    passphrase: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Warning: {}", e);
    }

    if let Err(e) = run(cli) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        if let Some(hint) = e.downcast_ref::<Error>().and_then(hint) {
            eprintln!("{}", hint);
        }
        process::exit(1);
    }
}

fn hint(e: &Error) -> Option<&'static str> {
    if let Error::CardNotSuitable(NotSuitable::SecureChannelRequired) = e {
        return Some(
            "This card's firmware requires a secure channel, which this tool does not implement; \
             only cards without one (or --simulator) can be used.",
        );
    }
    match e.kind() {
        ErrorKind::InvalidPin if e.is_pin_retryable() => Some("Check the PIN and try again."),
        ErrorKind::InvalidPin => Some("The PIN is now blocked."),
        ErrorKind::Card => Some("Check that the card is inserted, then reconnect."),
        _ => None,
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, String> {
    match path {
        Some(path) => Config::load(path).map_err(|e| e.to_string()),
        None => Ok(Config::from_env()),
    }
}

fn open_transport(cli: &Cli) -> Result<Box<dyn CardTransport>, String> {
    if let Some(kind) = cli.simulator {
        info!("Using virtual {:?} card", kind);
        return Ok(Box::new(VirtualCard::persistent(cli.sim_dir.clone(), kind.blank_state())));
    }
    reader_transport(cli.reader.clone())
}

#[cfg(feature = "pcsc")]
fn reader_transport(filter: Option<String>) -> Result<Box<dyn CardTransport>, String> {
    Ok(Box::new(seedkeeper_tool::protocol::pcsc::PcscTransport::new(filter)))
}

#[cfg(not(feature = "pcsc"))]
fn reader_transport(_filter: Option<String>) -> Result<Box<dyn CardTransport>, String> {
    Err("built without PC/SC support; use --simulator or rebuild with --features pcsc".to_string())
}

/// Boxed so both simulator and readers fit one controller type
type Tool = Controller<Box<dyn CardTransport>>;

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli.config.as_ref())?;

    if let Command::GenerateSeed { words } = &cli.command {
        let mnemonic = mnemonic::generate(*words, &config)?;
        println!("{}", mnemonic.join(" "));
        return Ok(());
    }

    let transport = open_transport(&cli)?;
    let mut controller: Tool = Controller::new(transport, config);
    let card = controller.connect()?;
    println!(
        "{} {} (label: {})",
        card.card_type,
        card.firmware_version,
        card.label.as_deref().unwrap_or("-")
    );

    let pin = cli.pin.as_deref().map(Pin::from);
    let result = dispatch(&mut controller, cli.command, pin.as_ref());
    controller.disconnect();
    result
}

fn require_pin(pin: Option<&Pin>) -> Result<&Pin, String> {
    pin.ok_or_else(|| "this command needs the PIN (--pin or SEEDKEEPER_PIN)".to_string())
}

fn login(controller: &mut Tool, pin: Option<&Pin>) -> Result<(), Box<dyn std::error::Error>> {
    controller.verify_pin(require_pin(pin)?)?;
    Ok(())
}

fn dispatch(controller: &mut Tool, command: Command, pin: Option<&Pin>) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Status => {
            let status = controller.get_card_status()?;
            println!("Setup done: {}", status.setup_done);
            println!("Seeded: {}", status.is_seeded);
            println!("PIN tries left: {}", status.pin_tries_remaining);
            println!("PUK tries left: {}", status.puk_tries_remaining);
            println!("2FA: {}", status.needs_2fa);
            let authenticity = controller.verify_authenticity()?;
            println!("Authenticity: {:?}", authenticity);

            if pin.is_some() && controller.supports(Feature::SecretStorage) {
                login(controller, pin)?;
                let sk = controller.get_seedkeeper_status()?;
                println!("Secrets: {}", sk.secret_count);
                println!("Memory: {} free of {} bytes", sk.free_memory, sk.total_memory);
                println!("Logs: {} available of {}", sk.available_logs, sk.total_logs);
                if let Some(last) = sk.last_log {
                    println!("Last log: {}", last);
                }
            }
        }
        Command::List => {
            login(controller, pin)?;
            for header in controller.list_secrets()? {
                println!(
                    "{:>5}  {:<18} {}  {}",
                    header.id,
                    header.secret_type.to_string(),
                    header.fingerprint_hex(),
                    header.label
                );
            }
        }
        Command::Show { id } => {
            login(controller, pin)?;
            let secret = controller.get_secret_details(id)?;
            println!("Label: {}", secret.label());
            println!("Type: {}", secret.secret_type());
            println!("Fingerprint: {}", secret.header.fingerprint_hex());
            print_payload(&secret.payload);
        }
        Command::ImportMnemonic(args) => {
            login(controller, pin)?;
            let words: Vec<String> = args.words.split_whitespace().map(str::to_owned).collect();
            let id = controller.import_mnemonic(&args.label, &words, args.passphrase.as_deref())?;
            println!("Stored mnemonic as secret {}", id);
        }
        Command::ImportPassword(args) => {
            login(controller, pin)?;
            let id = controller.import_password(&args.label, &args.login, &args.password, args.url.as_deref())?;
            println!("Stored password as secret {}", id);
        }
        Command::ImportText { label, text } => {
            login(controller, pin)?;
            let id = controller.import_text(&label, &text)?;
            println!("Stored text as secret {}", id);
        }
        Command::ImportDescriptor { label, descriptor } => {
            login(controller, pin)?;
            let id = controller.import_descriptor(&label, &descriptor)?;
            println!("Stored descriptor as secret {}", id);
        }
        Command::Erase { id } => {
            login(controller, pin)?;
            controller.erase_secret(id)?;
            println!("Secret {} erased", id);
        }
        Command::ChangePin(args) => {
            login(controller, pin)?;
            let old = require_pin(pin)?;
            controller.change_pin(old, &Pin::from(args.new_pin.as_str()), &Pin::from(args.confirm_pin.as_str()))?;
            println!("PIN changed");
        }
        Command::Label { new_label } => {
            login(controller, pin)?;
            if let Some(label) = new_label {
                controller.edit_card_label(&label)?;
            }
            let info = controller.get_card_label_info()?;
            println!("Label: {}", info.label.as_deref().unwrap_or("-"));
        }
        Command::Logs => {
            login(controller, pin)?;
            for entry in controller.get_logs()? {
                println!("{}", entry);
            }
        }
        Command::Backup(args) => {
            login(controller, pin)?;
            let backup = controller.make_backup(&args.include)?;
            backup.save(&args.output)?;
            println!("Backup of {} secret(s) written to {}", backup.secrets.len(), args.output.display());
        }
        Command::Init(args) => {
            let pin = require_pin(pin)?;
            let policy = match (args.generate, args.mnemonic) {
                (Some(size), _) => SeedPolicy::Generate { size },
                (None, Some(mnemonic)) => SeedPolicy::Mnemonic {
                    words: mnemonic.split_whitespace().map(str::to_owned).collect(),
                    passphrase: args.passphrase,
                },
                (None, None) => SeedPolicy::PinOnly,
            };
            debug!("Initializing with {:?}", policy);
            match controller.initialize(pin, &Pin::from(args.confirm_pin.as_str()), &policy)? {
                Some(id) => println!("Card initialized, seed stored as secret {}", id),
                None => println!("Card initialized"),
            }
        }
        Command::GenerateSeed { .. } => {}
    }
    Ok(())
}

fn print_payload(payload: &SecretPayload) {
    match payload {
        SecretPayload::Masterseed { seed } => println!("Seed: {}", hex::encode(seed)),
        SecretPayload::Mnemonic { words, passphrase } => {
            println!("Mnemonic: {}", words.join(" "));
            if let Some(passphrase) = passphrase {
                println!("Passphrase: {}", passphrase);
            }
        }
        SecretPayload::Password { login, password, url } => {
            println!("Login: {}", login);
            println!("Password: {}", password);
            if let Some(url) = url {
                println!("URL: {}", url);
            }
        }
        SecretPayload::FreeText { text } => println!("{}", text),
        SecretPayload::WalletDescriptor { descriptor } => println!("{}", descriptor),
    }
}
