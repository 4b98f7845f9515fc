use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::error::AppError;
use crate::models::Credential;

/// Parses a single `identity:secret` pair. The secret may itself contain `:`.
pub fn parse_pair(raw: &str) -> Result<Credential, AppError> {
    let (identity, secret) = raw.trim().split_once(':').ok_or_else(|| {
        AppError::InputFormatError("expected credentials in the form identity:secret".into())
    })?;

    let identity = identity.trim();
    if identity.is_empty() {
        return Err(AppError::InputFormatError(
            "credential identity must not be empty".into(),
        ));
    }

    Ok(Credential::new(identity, secret))
}

/// Reads newline-delimited pairs. Malformed and blank lines are skipped with a
/// warning; repeated identical pairs are kept once, in first-seen order.
pub fn parse_credential_lines(contents: &str) -> Vec<Credential> {
    let mut seen = HashSet::new();
    let mut credentials = Vec::new();

    for (index, line) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            warn!("Skipping blank credentials line {}", line_no);
            continue;
        }

        match parse_pair(line) {
            Ok(credential) => {
                if seen.insert(line.to_owned()) {
                    credentials.push(credential);
                } else {
                    debug!("Skipping duplicate credentials on line {}", line_no);
                }
            }
            Err(e) => warn!("Skipping credentials line {}: {}", line_no, e),
        }
    }

    credentials
}

pub fn load_credentials_file(path: &Path) -> Result<Vec<Credential>, AppError> {
    if !path.is_file() {
        return Err(AppError::InputFormatError(format!(
            "credentials file {} does not exist",
            path.display()
        )));
    }

    let contents = std::fs::read_to_string(path)?;
    let credentials = parse_credential_lines(&contents);
    info!(
        "Loaded {} account(s) from {}",
        credentials.len(),
        path.display()
    );
    Ok(credentials)
}

pub fn from_cli(cli_args: &CliArgs) -> Result<Vec<Credential>, AppError> {
    from_cli_with_prompt(cli_args, || {
        tokio::task::block_in_place(|| rpassword::prompt_password("Password: ").ok())
    })
}

/// `prompt` is only asked when `--email` comes without `--password`.
fn from_cli_with_prompt(
    cli_args: &CliArgs,
    prompt: impl FnOnce() -> Option<String>,
) -> Result<Vec<Credential>, AppError> {
    match (&cli_args.login, &cli_args.credentials_file, &cli_args.email) {
        (Some(pair), None, None) => Ok(vec![parse_pair(pair)?]),
        (None, Some(path), None) => load_credentials_file(path),
        (None, None, Some(email)) => {
            let secret = match &cli_args.password {
                Some(password) => password.clone(),
                None => prompt().ok_or_else(|| {
                    AppError::InputFormatError("no password was entered".into())
                })?,
            };
            Ok(vec![Credential::new(email.trim(), secret)])
        }
        _ => Err(AppError::InputFormatError(
            "exactly one of --login, --credentials-file or --email is required".into(),
        )),
    }
}
