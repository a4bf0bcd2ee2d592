use clap::Parser;
use htdigest::{CredentialStore, DEFAULT_FILE_NAME, DigestAlgorithm};
use snafu::ResultExt;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

/// Manage per-realm HTTP Digest credential files.
#[derive(Parser)]
#[command(name = "htdigest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding one sub-directory per realm
    #[arg(long, env = "HTDIGEST_ROOT", default_value = ".")]
    root: PathBuf,

    /// Name of the credential file inside each realm directory
    #[arg(long, env = "HTDIGEST_FILE_NAME", default_value = DEFAULT_FILE_NAME)]
    file_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Append a credential for a user
    Add {
        /// Authentication realm
        realm: String,
        /// Username to add
        username: String,
        /// Digest algorithm to use (md5, sha256)
        #[arg(long, default_value = "md5")]
        algorithm: String,
        /// Read password from stdin instead of prompting
        #[arg(long)]
        password: bool,
    },

    /// Replace every credential of a user with a new one
    Update {
        /// Authentication realm
        realm: String,
        /// Username to update
        username: String,
        /// Digest algorithm to use (md5, sha256)
        #[arg(long, default_value = "md5")]
        algorithm: String,
        /// Read password from stdin instead of prompting
        #[arg(long)]
        password: bool,
    },

    /// Remove every credential of a user
    Remove {
        /// Authentication realm
        realm: String,
        /// Username to remove
        username: String,
    },

    /// Exit successfully if the user has a credential in the realm
    Exists {
        /// Authentication realm
        realm: String,
        /// Username to look up
        username: String,
    },

    /// Verify a user's password
    Verify {
        /// Authentication realm
        realm: String,
        /// Username to verify
        username: String,
        /// Read password from stdin instead of prompting
        #[arg(long)]
        password: bool,
    },

    /// List all users of a realm
    List {
        /// Authentication realm
        realm: String,
    },
}

type Result<T> = ::std::result::Result<T, snafu::Whatever>;

fn read_password_from_stdin() -> Result<Zeroizing<String>> {
    let mut password = Zeroizing::new(String::new());
    io::stdin()
        .read_to_string(&mut password)
        .whatever_context("Can't read password from stdin")?;
    Ok(Zeroizing::new(password.trim_end().to_string()))
}

fn prompt_password() -> Result<Zeroizing<String>> {
    rpassword::prompt_password("Enter password: ")
        .whatever_context("Can't prompt for password")
        .map(Zeroizing::new)
}

fn prompt_password_confirm() -> Result<Zeroizing<String>> {
    let password = Zeroizing::new(
        rpassword::prompt_password("New password: ")
            .whatever_context("Can't prompt for new password")?,
    );
    let confirm = Zeroizing::new(
        rpassword::prompt_password("Re-type new password: ")
            .whatever_context("Can't prompt for password re-type")?,
    );
    snafu::ensure_whatever!(*password == *confirm, "Passwords do not match");
    Ok(password)
}

fn new_password(from_stdin: bool) -> Result<Zeroizing<String>> {
    if from_stdin {
        read_password_from_stdin()
    } else {
        prompt_password_confirm()
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = CredentialStore::new(cli.root).with_file_name(cli.file_name);

    match cli.command {
        Commands::Add {
            realm,
            username,
            algorithm,
            password: from_stdin,
        } => {
            let algo: DigestAlgorithm = algorithm
                .parse()
                .whatever_context("Can't parse algorithm name")?;
            let password = new_password(from_stdin)?;

            store
                .with_algorithm(algo)
                .add(&username, &realm, &password)
                .whatever_context("Can't add user")?;

            println!("Adding password for {} in realm {}", username, realm);
            Ok(())
        }

        Commands::Update {
            realm,
            username,
            algorithm,
            password: from_stdin,
        } => {
            let algo: DigestAlgorithm = algorithm
                .parse()
                .whatever_context("Can't parse algorithm name")?;
            let password = new_password(from_stdin)?;

            store
                .with_algorithm(algo)
                .set(&username, &realm, &password)
                .whatever_context("Can't update user")?;

            println!("Changing password for {} in realm {}", username, realm);
            Ok(())
        }

        Commands::Remove { realm, username } => {
            let removed = store
                .remove(&username, &realm)
                .whatever_context("Can't remove user")?;

            if removed == 0 {
                println!("User {} has no entry in realm {}", username, realm);
            } else {
                println!("Deleting user {} from realm {}", username, realm);
            }
            Ok(())
        }

        Commands::Exists { realm, username } => {
            let exists = store
                .exists(&username, &realm)
                .whatever_context("Can't read password file")?;

            if exists {
                println!("user {}: present in realm {}", username, realm);
                Ok(())
            } else {
                println!("user {}: absent from realm {}", username, realm);
                std::process::exit(1);
            }
        }

        Commands::Verify {
            realm,
            username,
            password: from_stdin,
        } => {
            let password = if from_stdin {
                read_password_from_stdin()?
            } else {
                prompt_password()?
            };

            match store.verify(&username, &realm, &password) {
                Ok(true) => {
                    println!("user {}: password correct", username);
                    Ok(())
                }
                Ok(false) => {
                    snafu::whatever!("user {}: password incorrect", username)
                }
                Err(e) => {
                    snafu::whatever!("user {}: {}", username, e)
                }
            }
        }

        Commands::List { realm } => {
            let users = store
                .list_users(&realm)
                .whatever_context("Can't read password file")?;

            for user in users {
                println!("{}", user);
            }

            Ok(())
        }
    }
}

#[snafu::report]
fn main() -> Result<()> {
    init_logging();
    run()
}
