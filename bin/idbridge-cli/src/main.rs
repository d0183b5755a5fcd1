//! idbridge CLI - Admin Command Line Interface
//!
//! This binary administers a Unix account store and exercises the password
//! encoders directly.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idbridge_common::{Identity, Role};
use idbridge_crypt::{EncoderDefaults, EncoderRegistry};
use idbridge_unix::{NewIdentity, PasswordResetType, UnixAccountStore, UnixStoreConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "idbridge-cli")]
#[command(about = "idbridge Admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "IDBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// passwd file, overriding the configuration
    #[arg(long)]
    passwd_file: Option<PathBuf>,

    /// shadow file, overriding the configuration
    #[arg(long)]
    shadow_file: Option<PathBuf>,

    /// group file, overriding the configuration
    #[arg(long)]
    group_file: Option<PathBuf>,

    /// Algorithm for new passwords, overriding the configuration
    #[arg(long)]
    algorithm: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// User operations
    User {
        #[command(subcommand)]
        action: UserCommands,
    },
    /// Group operations
    Group {
        #[command(subcommand)]
        action: GroupCommands,
    },
    /// Password encoder operations
    Hash {
        #[command(subcommand)]
        action: HashCommands,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// List all users
    List,
    /// Show user details
    Show {
        /// Login name
        name: String,
    },
    /// Create a new user
    Create {
        /// Login name
        name: String,
        /// Explicit uid
        #[arg(short, long)]
        uid: Option<u32>,
        /// Primary gid
        #[arg(short, long)]
        gid: Option<u32>,
        /// Comment, usually the full name
        #[arg(short, long, default_value = "")]
        comment: String,
        /// Home directory
        #[arg(long)]
        home: Option<String>,
        /// Login shell
        #[arg(short, long)]
        shell: Option<String>,
        /// Initial password
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Delete a user
    Delete {
        /// Login name
        name: String,
    },
    /// Lock a user
    Lock {
        /// Login name
        name: String,
    },
    /// Unlock a user
    Unlock {
        /// Login name
        name: String,
    },
    /// Set a user's password
    Passwd {
        /// Login name
        name: String,
        /// New password; read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
        /// Require a change at next login
        #[arg(long)]
        expire: bool,
    },
    /// Check a user's password
    Verify {
        /// Login name
        name: String,
        /// Password; read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum GroupCommands {
    /// List all groups
    List,
    /// Show group details
    Show {
        /// Group name
        name: String,
    },
    /// Create a new group
    Create {
        /// Group name
        name: String,
        /// Explicit gid
        #[arg(short, long)]
        gid: Option<u32>,
        /// Initial members
        #[arg(short, long, value_delimiter = ',')]
        members: Vec<String>,
    },
    /// Delete a group
    Delete {
        /// Group name
        name: String,
    },
    /// Add a supplementary member
    AddMember {
        /// Group name
        group: String,
        /// Login name
        user: String,
    },
    /// Remove a supplementary member
    RemoveMember {
        /// Group name
        group: String,
        /// Login name
        user: String,
    },
}

#[derive(Subcommand, Debug)]
enum HashCommands {
    /// Encode a value
    Encode {
        /// Algorithm identifier
        algorithm: String,
        /// Plain text
        plain: String,
        /// Explicit salt
        #[arg(short, long)]
        salt: Option<String>,
        /// Secret for reversible algorithms
        #[arg(long)]
        secret: Option<String>,
    },
    /// Check a plain text against an encoded value
    Verify {
        /// Encoded value
        encoded: String,
        /// Plain text
        plain: String,
        /// Algorithm identifier; detected from the value when omitted
        #[arg(short, long)]
        algorithm: Option<String>,
        /// Secret for reversible algorithms
        #[arg(long)]
        secret: Option<String>,
    },
    /// Detect the algorithm of an encoded value
    Sniff {
        /// Encoded value
        encoded: String,
    },
    /// List algorithm identifiers
    Algorithms,
}

/// Configuration file layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    store: UnixStoreConfig,
    #[serde(default)]
    encoders: EncoderDefaults,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config: Config = match &args.config {
        Some(path) => {
            let config_str = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&config_str)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => Config::default(),
    };

    // CLI takes precedence over the file
    if let Some(path) = &args.passwd_file {
        config.store.passwd_file.clone_from(path);
    }
    if let Some(path) = &args.shadow_file {
        config.store.shadow_file = Some(path.clone());
    }
    if let Some(path) = &args.group_file {
        config.store.group_file = Some(path.clone());
    }
    if let Some(algorithm) = &args.algorithm {
        config.store.password_algorithm.clone_from(algorithm);
    }
    Ok(config)
}

fn read_password(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_identity(identity: &Identity) {
    println!("Name:          {}", identity.name);
    println!("UID:           {}", identity.uid);
    println!(
        "GID:           {} ({})",
        identity.gid,
        identity.primary_group.as_deref().unwrap_or("-")
    );
    println!("Comment:       {}", identity.gecos);
    println!("Home:          {}", identity.home);
    println!("Shell:         {}", identity.shell);
    println!("Groups:        {}", identity.groups.join(","));
    println!("Account:       {:?}", identity.account_status.status);
    if let Some(status) = &identity.password_status {
        println!("Password:      {:?}", status.status);
        if let Some(date) = status.last_change {
            println!("Last change:   {date}");
        }
        if let Some(date) = status.expire {
            println!("Expires:       {date}");
        }
    }
    match identity.last_login {
        Some(time) => println!("Last login:    {time}"),
        None => println!("Last login:    -"),
    }
}

fn print_role(role: &Role, members: &[String]) {
    println!("Name:    {}", role.name);
    println!("GID:     {}", role.gid);
    println!("Members: {}", members.join(","));
}

fn open_store(config: Config, registry: Arc<EncoderRegistry>) -> Result<UnixAccountStore> {
    let store = UnixAccountStore::new(config.store, registry);
    store.open().context("Failed to open account store")?;
    Ok(store)
}

fn run_user(store: &UnixAccountStore, action: UserCommands, json: bool) -> Result<()> {
    match action {
        UserCommands::List => {
            let identities = store.list_identities()?;
            if json {
                return print_json(&identities);
            }
            println!("{:<20} {:<8} {:<8} {:<10} {:<30}", "NAME", "UID", "GID", "STATUS", "HOME");
            println!("{}", "-".repeat(80));
            for identity in identities {
                println!(
                    "{:<20} {:<8} {:<8} {:<10} {:<30}",
                    identity.name,
                    identity.uid,
                    identity.gid,
                    format!("{:?}", identity.account_status.status),
                    identity.home
                );
            }
        }
        UserCommands::Show { name } => {
            let identity = store.get_identity(&name)?;
            if json {
                return print_json(&identity);
            }
            print_identity(&identity);
        }
        UserCommands::Create {
            name,
            uid,
            gid,
            comment,
            home,
            shell,
            password,
        } => {
            let identity = store.create_identity(NewIdentity {
                name,
                uid,
                gid,
                gecos: comment,
                home,
                shell,
                password,
            })?;
            if json {
                return print_json(&identity);
            }
            println!("User '{}' created with uid {}", identity.name, identity.uid);
        }
        UserCommands::Delete { name } => {
            store.delete_identity(&name)?;
            println!("User '{name}' deleted");
        }
        UserCommands::Lock { name } => {
            store.lock_identity(&name)?;
            println!("User '{name}' locked");
        }
        UserCommands::Unlock { name } => {
            store.unlock_identity(&name)?;
            println!("User '{name}' unlocked");
        }
        UserCommands::Passwd {
            name,
            password,
            expire,
        } => {
            let password = read_password(password)?;
            store.set_password(&name, &password, expire, PasswordResetType::Administrative)?;
            println!("Password of '{name}' updated");
        }
        UserCommands::Verify { name, password } => {
            let password = read_password(password)?;
            let valid = store.are_credentials_valid(&name, &password)?;
            if json {
                return print_json(&serde_json::json!({ "name": name, "valid": valid }));
            }
            println!("{}", if valid { "valid" } else { "invalid" });
            if !valid {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn run_group(store: &UnixAccountStore, action: GroupCommands, json: bool) -> Result<()> {
    match action {
        GroupCommands::List => {
            let roles = store.list_roles()?;
            if json {
                return print_json(&roles);
            }
            println!("{:<20} {:<8} {:<50}", "NAME", "GID", "MEMBERS");
            println!("{}", "-".repeat(80));
            for role in roles {
                println!("{:<20} {:<8} {:<50}", role.name, role.gid, role.members.join(","));
            }
        }
        GroupCommands::Show { name } => {
            let role = store.get_role(&name)?;
            let members = store.members_of(&name)?;
            if json {
                return print_json(&serde_json::json!({ "role": role, "members": members }));
            }
            print_role(&role, &members);
        }
        GroupCommands::Create { name, gid, members } => {
            let role = store.create_role(&name, gid, members)?;
            if json {
                return print_json(&role);
            }
            println!("Group '{}' created with gid {}", role.name, role.gid);
        }
        GroupCommands::Delete { name } => {
            store.delete_role(&name)?;
            println!("Group '{name}' deleted");
        }
        GroupCommands::AddMember { group, user } => {
            if store.add_member(&group, &user)? {
                println!("Added '{user}' to '{group}'");
            } else {
                println!("'{user}' is already a member of '{group}'");
            }
        }
        GroupCommands::RemoveMember { group, user } => {
            if store.remove_member(&group, &user)? {
                println!("Removed '{user}' from '{group}'");
            } else {
                println!("'{user}' is not a member of '{group}'");
            }
        }
    }
    Ok(())
}

/// Check `plain` against a value as printed by `hash encode`
///
/// Binary encoders print hex. Without an algorithm the hex decoding is tried
/// against the binary encoders first, then the value is sniffed as given.
fn verify_encoded(
    registry: &EncoderRegistry,
    encoded: &str,
    plain: &str,
    algorithm: Option<&str>,
    secret: Option<&str>,
) -> Result<bool> {
    let secret = secret.map(str::as_bytes);
    if let Some(id) = algorithm {
        let encoder = registry.get(id)?;
        if encoder.is_text() {
            return Ok(encoder.matches(encoded.as_bytes(), plain.as_bytes(), secret)?);
        }
        let bytes = hex::decode(encoded).with_context(|| format!("{} values are hex encoded", encoder.id()))?;
        return Ok(encoder.matches(&bytes, plain.as_bytes(), secret)?);
    }

    if let Ok(bytes) = hex::decode(encoded) {
        for id in registry.ids() {
            let Ok(encoder) = registry.get(id) else {
                continue;
            };
            if !encoder.is_text()
                && encoder.is_of_type(&bytes)
                && encoder.matches(&bytes, plain.as_bytes(), secret).unwrap_or(false)
            {
                return Ok(true);
            }
        }
    }
    Ok(registry.verify(encoded.as_bytes(), plain.as_bytes(), secret)?)
}

fn run_hash(registry: &EncoderRegistry, action: HashCommands, json: bool) -> Result<()> {
    match action {
        HashCommands::Encode {
            algorithm,
            plain,
            salt,
            secret,
        } => {
            let encoder = registry.get(&algorithm)?;
            let encoded = if encoder.is_text() {
                String::from_utf8_lossy(&encoder.encode(
                    plain.as_bytes(),
                    salt.as_deref().map(str::as_bytes),
                    secret.as_deref().map(str::as_bytes),
                )?)
                .into_owned()
            } else {
                hex::encode(encoder.encode(
                    plain.as_bytes(),
                    salt.as_deref().map(str::as_bytes),
                    secret.as_deref().map(str::as_bytes),
                )?)
            };
            if json {
                return print_json(&serde_json::json!({ "algorithm": encoder.id(), "encoded": encoded }));
            }
            println!("{encoded}");
        }
        HashCommands::Verify {
            encoded,
            plain,
            algorithm,
            secret,
        } => {
            let valid = verify_encoded(registry, &encoded, &plain, algorithm.as_deref(), secret.as_deref())?;
            if json {
                return print_json(&serde_json::json!({ "valid": valid }));
            }
            println!("{}", if valid { "valid" } else { "invalid" });
            if !valid {
                std::process::exit(1);
            }
        }
        HashCommands::Sniff { encoded } => {
            let id = registry
                .find_by_type(encoded.as_bytes())
                .map(|encoder| encoder.id().to_string());
            if json {
                return print_json(&serde_json::json!({ "algorithm": id }));
            }
            println!("{}", id.as_deref().unwrap_or("unknown"));
        }
        HashCommands::Algorithms => {
            let ids = registry.ids();
            if json {
                return print_json(&ids);
            }
            for id in ids {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;
    let registry = Arc::new(
        EncoderRegistry::with_defaults(&config.encoders).context("Invalid encoder settings")?,
    );
    tracing::debug!("Loaded {} encoders", registry.ids().len());

    match args.command {
        Commands::User { action } => {
            let store = open_store(config, Arc::clone(&registry))?;
            run_user(&store, action, args.json)
        }
        Commands::Group { action } => {
            let store = open_store(config, Arc::clone(&registry))?;
            run_group(&store, action, args.json)
        }
        Commands::Hash { action } => run_hash(&registry, action, args.json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_sections() {
        let config: Config = toml::from_str(
            r#"
            [store]
            passwd_file = "/srv/passwd"
            password_algorithm = "BCRYPT"

            [encoders]
            bcrypt_cost = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.store.passwd_file, PathBuf::from("/srv/passwd"));
        assert_eq!(config.store.password_algorithm, "BCRYPT");
        assert_eq!(config.encoders.bcrypt_cost, 4);
        assert_eq!(config.store.first_id, 1000);
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "idbridge-cli",
            "--passwd-file",
            "/tmp/passwd",
            "--algorithm",
            "MD5CRYPT",
            "hash",
            "algorithms",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.store.passwd_file, PathBuf::from("/tmp/passwd"));
        assert_eq!(config.store.password_algorithm, "MD5CRYPT");
        assert_eq!(config.store.shadow_file, Some(PathBuf::from("/etc/shadow")));
    }

    #[test]
    fn test_verify_accepts_encode_output() {
        let defaults = EncoderDefaults {
            bcrypt_cost: 4,
            ..EncoderDefaults::default()
        };
        let registry = EncoderRegistry::with_defaults(&defaults).unwrap();
        let secret = Some(b"pw".as_slice());

        for id in ["PBEWITHMD5ANDDES", "AES256"] {
            let encoded = hex::encode(registry.get(id).unwrap().encode(b"s3cret", None, secret).unwrap());
            assert!(verify_encoded(&registry, &encoded, "s3cret", Some(id), Some("pw")).unwrap());
            assert!(verify_encoded(&registry, &encoded, "s3cret", None, Some("pw")).unwrap());
            assert!(!verify_encoded(&registry, &encoded, "other", None, Some("pw")).unwrap());
        }
        assert!(verify_encoded(&registry, "zz", "x", Some("PBEWITHMD5ANDDES"), Some("pw")).is_err());

        let hash = registry.encode_str("MD5CRYPT", "s3cret", None, None, idbridge_common::Charset::Utf8).unwrap();
        assert!(verify_encoded(&registry, &hash, "s3cret", None, None).unwrap());
        assert!(verify_encoded(&registry, &hash, "s3cret", Some("md5crypt"), None).unwrap());
    }
}
