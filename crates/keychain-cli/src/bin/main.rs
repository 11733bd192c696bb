//! keychain-items CLI - generic and internet keychain items from the shell
//!
//! Uses the same settings file and keychain namespace as any application
//! built on keychain-core, so items created here are visible there.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

use keychain_core::settings::default_data_dir;
use keychain_core::{
    AttributeValue, Attributes, AuthenticationType, Backend, Credential, GenericCredential,
    InternetCredential, InternetTarget, Keychain, Protocol, SettingsManager,
};

/// Keychain Items - create, look up, list and remove keychain credentials
#[derive(Parser, Debug)]
#[command(name = "keychain-items")]
#[command(version)]
#[command(about = "Keychain Items - typed access to the platform credential store")]
struct Args {
    /// Use a throwaway in-memory store instead of the OS keychain
    #[arg(long, global = true)]
    memory: bool,

    /// Settings file (default: settings.json in the data directory)
    #[arg(long, env = "KEYCHAIN_ITEMS_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Service/account passwords
    Generic {
        #[command(subcommand)]
        action: GenericAction,
    },
    /// Passwords scoped to a network endpoint
    Internet {
        #[command(subcommand)]
        action: InternetAction,
    },
    /// Print the application identifier, creating it on first use
    AppId,
}

#[derive(Subcommand, Debug)]
enum GenericAction {
    /// Add a new item
    Add {
        #[arg(long)]
        service: String,
        #[arg(long)]
        account: String,
        #[arg(long, env = "KEYCHAIN_ITEMS_PASSWORD", hide_env_values = true)]
        password: String,
        #[command(flatten)]
        extra: ExtraArgs,
    },
    /// Show a single item
    Get {
        #[arg(long)]
        service: String,
        #[arg(long)]
        account: String,
        /// Include the password in the output
        #[arg(long)]
        show_password: bool,
        #[command(flatten)]
        extra: ExtraArgs,
    },
    /// List every item of a service
    List {
        #[arg(long)]
        service: String,
        #[command(flatten)]
        extra: ExtraArgs,
    },
    /// Remove a single item
    Rm {
        #[arg(long)]
        service: String,
        #[arg(long)]
        account: String,
    },
}

#[derive(Subcommand, Debug)]
enum InternetAction {
    /// Add a new item
    Add {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        account: String,
        #[arg(long, env = "KEYCHAIN_ITEMS_PASSWORD", hide_env_values = true)]
        password: String,
        #[command(flatten)]
        extra: ExtraArgs,
    },
    /// Show a single item
    Get {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        account: String,
        /// Include the password in the output
        #[arg(long)]
        show_password: bool,
        #[command(flatten)]
        extra: ExtraArgs,
    },
    /// List every item matching the endpoint
    List {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        extra: ExtraArgs,
    },
    /// Remove a single item
    Rm {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        account: String,
    },
}

/// Network endpoint fields; omitted fields are unconstrained
#[derive(ClapArgs, Debug)]
struct TargetArgs {
    #[arg(long)]
    server: Option<String>,
    #[arg(long)]
    security_domain: Option<String>,
    #[arg(long)]
    path: Option<String>,
    #[arg(long)]
    port: Option<u32>,
    /// Protocol name or four-character code (e.g. https, htps, ssh)
    #[arg(long)]
    protocol: Option<String>,
    /// Authentication type name or code (e.g. html-form, http-basic)
    #[arg(long)]
    auth_type: Option<String>,
}

impl TargetArgs {
    fn to_target(&self) -> Result<InternetTarget> {
        Ok(InternetTarget {
            server: self.server.clone(),
            security_domain: self.security_domain.clone(),
            path: self.path.clone(),
            port: self.port,
            protocol: self
                .protocol
                .as_deref()
                .map(str::parse::<Protocol>)
                .transpose()?,
            authentication_type: self
                .auth_type
                .as_deref()
                .map(str::parse::<AuthenticationType>)
                .transpose()?,
        })
    }
}

#[derive(ClapArgs, Debug)]
struct ExtraArgs {
    /// Extra attribute as key=value (repeatable)
    #[arg(long = "attr", value_parser = parse_attr)]
    attrs: Vec<(String, String)>,
}

impl ExtraArgs {
    fn to_attributes(&self) -> Option<Attributes> {
        if self.attrs.is_empty() {
            return None;
        }
        Some(
            self.attrs
                .iter()
                .map(|(k, v)| (k.clone(), AttributeValue::from(v.as_str())))
                .collect(),
        )
    }
}

fn parse_attr(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let keychain = open_keychain(&args)?;
    debug!("Using {}", keychain.backend_name());

    let output = run(&keychain, args.command)?;
    if let Some(output) = output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}

fn open_keychain(args: &Args) -> Result<Keychain> {
    let manager = match &args.settings {
        Some(path) => SettingsManager::from_file(path.clone()),
        None => SettingsManager::new(&default_data_dir()?),
    }
    .context("Failed to load settings")?;

    let mut settings = manager.get().clone();
    if args.memory {
        settings.backend = Backend::Memory;
    }

    Keychain::from_settings(&settings).context("Failed to open keychain")
}

fn run(keychain: &Keychain, command: Command) -> Result<Option<Value>> {
    match command {
        Command::Generic { action } => run_generic(keychain, action),
        Command::Internet { action } => run_internet(keychain, action),
        Command::AppId => {
            let id = keychain
                .application_identifier()
                .context("Failed to read application identifier")?;
            Ok(Some(json!(id)))
        }
    }
}

fn run_generic(keychain: &Keychain, action: GenericAction) -> Result<Option<Value>> {
    match action {
        GenericAction::Add {
            service,
            account,
            password,
            extra,
        } => {
            let item = keychain
                .create_generic(&service, &account, &password, extra.to_attributes().as_ref())
                .with_context(|| format!("Failed to add '{}' for service '{}'", account, service))?;
            Ok(Some(generic_json(&item, false)))
        }
        GenericAction::Get {
            service,
            account,
            show_password,
            extra,
        } => {
            let item = keychain
                .lookup_generic(&service, &account, extra.to_attributes().as_ref())
                .with_context(|| format!("Failed to find '{}' for service '{}'", account, service))?;
            Ok(Some(generic_json(&item, show_password)))
        }
        GenericAction::List { service, extra } => {
            let items = keychain
                .list_generic(&service, extra.to_attributes().as_ref())
                .with_context(|| format!("Failed to list service '{}'", service))?;
            Ok(Some(Value::Array(
                items.iter().map(|item| generic_json(item, false)).collect(),
            )))
        }
        GenericAction::Rm { service, account } => {
            let item = keychain
                .lookup_generic(&service, &account, None)
                .with_context(|| format!("Failed to find '{}' for service '{}'", account, service))?;
            item.remove_from(keychain).context("Failed to remove item")?;
            Ok(None)
        }
    }
}

fn run_internet(keychain: &Keychain, action: InternetAction) -> Result<Option<Value>> {
    match action {
        InternetAction::Add {
            target,
            account,
            password,
            extra,
        } => {
            let item = keychain
                .create_internet(
                    &target.to_target()?,
                    &account,
                    &password,
                    extra.to_attributes().as_ref(),
                )
                .with_context(|| format!("Failed to add internet item for '{}'", account))?;
            Ok(Some(internet_json(&item, false)))
        }
        InternetAction::Get {
            target,
            account,
            show_password,
            extra,
        } => {
            let item = keychain
                .lookup_internet(&target.to_target()?, &account, extra.to_attributes().as_ref())
                .with_context(|| format!("Failed to find internet item for '{}'", account))?;
            Ok(Some(internet_json(&item, show_password)))
        }
        InternetAction::List { target, extra } => {
            let items = keychain
                .list_internet(&target.to_target()?, extra.to_attributes().as_ref())
                .context("Failed to list internet items")?;
            Ok(Some(Value::Array(
                items.iter().map(|item| internet_json(item, false)).collect(),
            )))
        }
        InternetAction::Rm { target, account } => {
            let item = keychain
                .lookup_internet(&target.to_target()?, &account, None)
                .with_context(|| format!("Failed to find internet item for '{}'", account))?;
            item.remove_from(keychain).context("Failed to remove item")?;
            Ok(None)
        }
    }
}

/// Attributes as JSON, with the password only when asked for
fn common_json(item: &impl Credential, show_password: bool) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();
    map.insert("account".into(), json!(item.account()));
    if show_password {
        map.insert("password".into(), json!(item.password()));
    }
    map.insert(
        "attributes".into(),
        item.attributes()
            .iter()
            .map(|(k, v)| (k.clone(), json!(v.to_string())))
            .collect::<serde_json::Map<_, _>>()
            .into(),
    );
    map
}

fn generic_json(item: &GenericCredential, show_password: bool) -> Value {
    let mut map = common_json(item, show_password);
    map.insert("service".into(), json!(item.service()));
    Value::Object(map)
}

fn internet_json(item: &InternetCredential, show_password: bool) -> Value {
    let mut map = common_json(item, show_password);
    map.insert("server".into(), json!(item.server()));
    map.insert("securityDomain".into(), json!(item.security_domain()));
    map.insert("path".into(), json!(item.path()));
    map.insert("port".into(), json!(item.port()));
    map.insert("protocol".into(), json!(item.protocol().map(|p| p.name())));
    map.insert(
        "authenticationType".into(),
        json!(item.authentication_type().map(|a| a.name())),
    );
    Value::Object(map)
}
