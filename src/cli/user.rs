use crate::cli::CliContext;
use crate::constants;
use crate::core::authenticator::{self, AddUserOutcome};
use anyhow::{bail, Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use dialoguer::Password;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::io::Read;
use zeroize::Zeroizing;

#[derive(Args, Debug)]
pub struct AddUserArgs {
    /// Username to add or update
    pub username: String,

    /// Read password from stdin instead of interactive prompt
    #[arg(long, conflicts_with = "generate")]
    pub from_stdin: bool,

    /// Generate a random password and print it once
    #[arg(long)]
    pub generate: bool,

    /// Length for generated password
    #[arg(long, default_value_t = constants::DEFAULT_GENERATED_LENGTH)]
    pub length: usize,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Username to check
    pub username: String,

    /// Read password from stdin instead of interactive prompt
    #[arg(long)]
    pub from_stdin: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Substring to look for in usernames
    pub query: String,

    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,
}

pub fn run_add(ctx: &CliContext, args: AddUserArgs) -> Result<()> {
    let path = ctx.password_file()?;

    if args.generate && args.length < 8 {
        bail!("--length must be at least 8");
    }
    if ctx.non_interactive && !args.from_stdin && !args.generate {
        bail!("--non-interactive requires --from-stdin or --generate for add-user");
    }

    let password = if args.generate {
        generate_password(args.length)
    } else {
        read_password(args.from_stdin, &args.username, true)?
    };

    match authenticator::add_or_update_user(path, &args.username, &password) {
        Ok(outcome) => {
            let action = match outcome {
                AddUserOutcome::Added => "add-user",
                AddUserOutcome::Updated => "update-user",
            };
            ctx.audit(action, &args.username, true, None);
            println!("{}", outcome.message());
            if args.generate {
                println!("Generated password: {}", password.as_str());
            }
            Ok(())
        }
        Err(e) => {
            ctx.audit("add-user", &args.username, false, Some(e.kind().to_string()));
            Err(e).context("Failed to add user")
        }
    }
}

pub fn run_verify(ctx: &CliContext, args: VerifyArgs) -> Result<()> {
    let path = ctx.password_file()?;
    if ctx.non_interactive && !args.from_stdin {
        bail!("--non-interactive requires --from-stdin for verify");
    }
    let password = read_password(args.from_stdin, &args.username, false)?;

    let verified = match authenticator::verify_credentials(path, &args.username, &password) {
        Ok(v) => v,
        Err(e) => {
            ctx.audit("verify", &args.username, false, Some(e.kind().to_string()));
            return Err(e.into());
        }
    };
    ctx.audit("verify", &args.username, verified, None);

    if verified {
        println!("authenticated");
        Ok(())
    } else {
        eprintln!("authentication failed");
        std::process::exit(1);
    }
}

pub fn run_list(ctx: &CliContext, args: ListArgs) -> Result<()> {
    check_format(&args.format)?;
    let users = authenticator::list_users(ctx.password_file()?)?;
    print_users(&users, &args.format)
}

pub fn run_search(ctx: &CliContext, args: SearchArgs) -> Result<()> {
    check_format(&args.format)?;
    let users = authenticator::search_users(ctx.password_file()?, &args.query)?;
    print_users(&users, &args.format)
}

fn check_format(format: &str) -> Result<()> {
    if format != "table" && format != "json" {
        bail!("invalid format: {} (use table|json)", format);
    }
    Ok(())
}

fn print_users(users: &[String], format: &str) -> Result<()> {
    if format == "json" {
        let json = serde_json::to_string_pretty(users).context("serialize users")?;
        println!("{}", json);
        return Ok(());
    }

    if users.is_empty() {
        println!("No users found");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![Cell::new("Username").add_attribute(Attribute::Bold)]);
    for user in users {
        table.add_row(vec![user.as_str()]);
    }
    println!("{}", table);
    Ok(())
}

fn read_password(from_stdin: bool, username: &str, confirm: bool) -> Result<Zeroizing<String>> {
    let password = if from_stdin {
        let mut buf = Zeroizing::new(String::new());
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read password from stdin")?;
        Zeroizing::new(buf.trim_end_matches(['\r', '\n']).to_string())
    } else {
        let mut prompt = Password::new()
            .with_prompt(format!("Password for {}", username))
            .allow_empty_password(false);
        if confirm {
            prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
        }
        Zeroizing::new(prompt.interact().context("read password from prompt")?)
    };
    if password.is_empty() {
        bail!("password cannot be empty");
    }
    if password.len() > constants::MAX_PASSWORD_SIZE {
        bail!(
            "password exceeds maximum size ({} bytes, max {} bytes)",
            password.len(),
            constants::MAX_PASSWORD_SIZE
        );
    }
    Ok(password)
}

fn generate_password(length: usize) -> Zeroizing<String> {
    Zeroizing::new(
        OsRng
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_password_length_and_charset() {
        let pw = generate_password(32);
        assert_eq!(pw.len(), 32);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_passwords_differ() {
        assert_ne!(*generate_password(24), *generate_password(24));
    }

    #[test]
    fn test_check_format() {
        assert!(check_format("table").is_ok());
        assert!(check_format("json").is_ok());
        assert!(check_format("yaml").is_err());
    }
}
