use clap::Parser;
use std::path::PathBuf;

use crate::scraping::sites::SiteKind;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Single account in the form identity:secret
    #[arg(long, value_name = "ID:SECRET", conflicts_with_all = ["credentials_file", "email"])]
    pub login: Option<String>,

    /// File with one identity:secret pair per line
    #[arg(long, value_name = "FILE", conflicts_with = "email")]
    pub credentials_file: Option<PathBuf>,

    /// Single account identity; the password is asked for unless --password is given
    #[arg(long, value_name = "EMAIL")]
    pub email: Option<String>,

    /// Password for --email
    #[arg(long, value_name = "PASSWORD", requires = "email")]
    pub password: Option<String>,

    /// Directory that receives one JSON checkpoint per account
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable log output
    #[arg(long)]
    pub log: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also append log records at the chosen level to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub head: bool,

    /// Re-run accounts whose checkpoint has unresolved cover references
    #[arg(long)]
    pub fix_covers: bool,

    /// Bookstore to scrape
    #[arg(long, value_enum)]
    pub site: Option<SiteKind>,

    /// WebDriver endpoint (chromedriver, geckodriver)
    #[arg(long, value_name = "URL")]
    pub webdriver_url: Option<String>,

    /// Download covers of every persisted account into this directory
    #[arg(long, value_name = "DIR")]
    pub cover_cache: Option<PathBuf>,
}

impl CliArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.login.is_none() && self.credentials_file.is_none() && self.email.is_none() {
            return Err("one of --login, --credentials-file or --email is required".to_string());
        }

        if self.email.as_deref().is_some_and(|email| email.trim().is_empty()) {
            return Err("--email must not be empty".to_string());
        }

        if let Some(pair) = &self.login {
            if !pair.contains(':') {
                return Err("--login must be given as identity:secret".to_string());
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Valid levels are: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("library-lister").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn credentials_source_is_required() {
        assert!(parse(&["--output", "out"]).validate().is_err());
        assert!(parse(&["--login", "a@x.com:pw"]).validate().is_ok());
    }

    #[test]
    fn login_without_separator_is_invalid() {
        assert!(parse(&["--login", "a@x.com"]).validate().is_err());
    }

    #[test]
    fn login_and_file_conflict() {
        let result = CliArgs::try_parse_from([
            "library-lister",
            "--login",
            "a@x.com:pw",
            "--credentials-file",
            "accounts.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn flags_map_to_fields() {
        let args = parse(&[
            "--credentials-file",
            "accounts.txt",
            "--head",
            "--fix-covers",
            "--log",
            "--site",
            "helion",
        ]);
        assert!(args.head && args.fix_covers && args.log);
        assert_eq!(args.site, Some(SiteKind::Helion));
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn email_alone_is_a_credentials_source() {
        let args = parse(&["--email", "a@x.com"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.password, None);
        assert!(parse(&["--email", " "]).validate().is_err());
    }

    #[test]
    fn password_needs_an_email() {
        let result =
            CliArgs::try_parse_from(["library-lister", "--login", "a@x.com:pw", "--password", "x"]);
        assert!(result.is_err());

        let result = CliArgs::try_parse_from([
            "library-lister",
            "--email",
            "a@x.com",
            "--credentials-file",
            "accounts.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn log_file_is_optional() {
        assert_eq!(parse(&["--login", "a@x.com:pw"]).log_file, None);
        let args = parse(&["--login", "a@x.com:pw", "--log-file", "logs/run.log"]);
        assert_eq!(args.log_file, Some(PathBuf::from("logs/run.log")));
    }
}
