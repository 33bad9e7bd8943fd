use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;
use reqkit::csv::DictReader;
use reqkit::http::{Client, ConnectionPool, DEFAULT_TIMEOUT_SECS, RequestOptions, Response};
use reqkit::transport::Body;

/// reqkit - requests-style HTTP client
///
/// Sends a GET or POST with retries until the response status is one of the
/// accepted codes, and prints the response body. Also reads CSV files as
/// one JSON object per row.
///
/// Examples:
///   reqkit get https://example.com/search -p q=rust
///   reqkit post https://example.com/api -d '{"a":1}' -H 'Content-Type: application/json'
///   reqkit csv users.csv
#[derive(Parser, Debug)]
#[command(author, version = env!("REQKIT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log debug output (also via RUST_LOG)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send a GET request
    Get(GetArgs),

    /// Send a POST request
    Post(PostArgs),

    /// Print the rows of a CSV file as JSON objects, one per line
    Csv(CsvArgs),
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    /// Target URL (http or https)
    #[arg(value_name = "URL")]
    url: String,

    /// Request header, repeatable
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Cookie, repeatable
    #[arg(short = 'b', long = "cookie", value_name = "NAME=VALUE", value_parser = parse_pair)]
    cookies: Vec<(String, String)>,

    /// Timeout in seconds; values below 1 keep millisecond precision
    #[arg(long, env = "REQKIT_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: f64,

    /// Number of attempts
    #[arg(long, env = "REQKIT_ATTEMPTS", default_value_t = 3, allow_negative_numbers = true)]
    attempts: i32,

    /// Seconds to wait between attempts
    #[arg(long = "retry-delay", env = "REQKIT_RETRY_DELAY", default_value_t = 3.0)]
    retry_delay: f64,

    /// Acceptable status code, repeatable
    #[arg(long = "accept", value_name = "CODE", default_values_t = [200])]
    accept: Vec<u16>,

    /// Do not follow redirects
    #[arg(long = "no-follow")]
    no_follow: bool,

    /// Print the status line and response headers before the body
    #[arg(short = 'i', long = "include")]
    include: bool,

    /// Pretty-print the body as JSON
    #[arg(long = "json")]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct GetArgs {
    #[command(flatten)]
    request: RequestArgs,

    /// Query parameter, repeatable
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_pair)]
    params: Vec<(String, String)>,
}

#[derive(clap::Args, Debug)]
struct PostArgs {
    #[command(flatten)]
    request: RequestArgs,

    /// Raw request body
    #[arg(short = 'd', long = "data", conflicts_with = "form")]
    data: Option<String>,

    /// Form field, repeatable
    #[arg(short = 'f', long = "form", value_name = "NAME=VALUE", value_parser = parse_pair)]
    form: Vec<(String, String)>,
}

#[derive(clap::Args, Debug)]
struct CsvArgs {
    /// CSV file to read
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Field delimiter
    #[arg(short = 'd', long = "delimiter", default_value_t = ',')]
    delimiter: char,

    /// Header name, repeatable; the first row is the header when omitted
    #[arg(long = "header", value_name = "NAME")]
    headers: Vec<String>,
}

fn parse_pair(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", value))
}

fn parse_header(value: &str) -> Result<(String, String), String> {
    value
        .split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected 'NAME: VALUE', got '{}'", value))
}

impl RequestArgs {
    fn options(&self) -> RequestOptions {
        let mut options = RequestOptions::new()
            .timeout(self.timeout)
            .max_attempts(self.attempts)
            .retry_delay(Duration::try_from_secs_f64(self.retry_delay).unwrap_or(Duration::ZERO))
            .accept(self.accept.iter().copied());
        for (name, value) in &self.headers {
            options = options.header(name, value);
        }
        for (name, value) in &self.cookies {
            options = options.cookie(name, value);
        }
        if self.no_follow {
            options = options.follow_redirects(false);
        }
        options
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Get(args) => {
            let pool = ConnectionPool::new();
            let client = Client::new(&pool);
            let options = args.request.options();
            let response = client.get(&args.request.url, &args.params, &options)?;
            report(&response, &args.request, &options)
        }
        Commands::Post(args) => {
            let pool = ConnectionPool::new();
            let client = Client::new(&pool);
            let options = args.request.options();
            let body = match args.data {
                Some(data) => Body::Text(data),
                None => Body::Form(args.form),
            };
            let response = client.post(&args.request.url, body, &options)?;
            report(&response, &args.request, &options)
        }
        Commands::Csv(args) => {
            let reader = DictReader::from_path(&args.path)
                .delimiter(args.delimiter)
                .headers(args.headers);
            let mut stdout = std::io::stdout().lock();
            for row in reader.rows()? {
                let line = serde_json::to_string(&row?)?;
                writeln!(stdout, "{}", line)?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report(response: &Response, args: &RequestArgs, options: &RequestOptions) -> Result<ExitCode> {
    debug!(
        "Finished {} (succeeded: {}, status: {})",
        response.url(),
        response.succeeded(),
        response.status_code()
    );

    if !response.succeeded() {
        eprintln!(
            "error {}: {} ({})",
            response.error_code(),
            response.error_message(),
            response.url()
        );
    }

    let mut stdout = std::io::stdout().lock();
    if args.include && response.succeeded() {
        writeln!(stdout, "{}", response.status_code())?;
        let mut headers: Vec<_> = response.headers().iter().collect();
        headers.sort();
        for (name, value) in headers {
            writeln!(stdout, "{}: {}", name, value)?;
        }
        writeln!(stdout)?;
    }

    if args.json {
        let value = response
            .json()
            .context("Response body is not valid JSON")?;
        writeln!(stdout, "{}", serde_json::to_string_pretty(&value)?)?;
    } else {
        stdout.write_all(response.body())?;
    }
    stdout.flush()?;

    if response.is_acceptable(&options.acceptable) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_get_parsing() {
        let cli = Cli::try_parse_from([
            "reqkit",
            "get",
            "http://example.com/search",
            "-p",
            "q=x",
            "-H",
            "Accept: application/json",
            "-b",
            "session=1",
        ])
        .unwrap();
        match cli.command {
            Commands::Get(args) => {
                assert_eq!(args.request.url, "http://example.com/search");
                assert_eq!(args.params, vec![("q".to_string(), "x".to_string())]);
                assert_eq!(
                    args.request.headers,
                    vec![("Accept".to_string(), "application/json".to_string())]
                );
                assert_eq!(args.request.accept, vec![200]);
                assert_eq!(args.request.attempts, 3);
            }
            _ => panic!("Expected Get command"),
        }
    }

    #[test]
    fn test_cli_post_parsing() {
        let cli = Cli::try_parse_from([
            "reqkit",
            "post",
            "https://example.com/api",
            "-d",
            "a=1",
            "--accept",
            "200",
            "--accept",
            "201",
            "--attempts",
            "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Post(args) => {
                assert_eq!(args.data.as_deref(), Some("a=1"));
                assert_eq!(args.request.accept, vec![200, 201]);
                assert_eq!(args.request.options().retry_policy().attempts(), 1);
            }
            _ => panic!("Expected Post command"),
        }
    }

    #[test]
    fn test_cli_post_data_conflicts_with_form() {
        let result = Cli::try_parse_from([
            "reqkit",
            "post",
            "https://example.com/api",
            "-d",
            "a=1",
            "-f",
            "b=2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_csv_parsing() {
        let cli = Cli::try_parse_from([
            "reqkit", "csv", "data.tsv", "-d", "\t", "--header", "a", "--header", "b",
        ])
        .unwrap();
        match cli.command {
            Commands::Csv(args) => {
                assert_eq!(args.path, PathBuf::from("data.tsv"));
                assert_eq!(args.delimiter, '\t');
                assert_eq!(args.headers, vec!["a", "b"]);
            }
            _ => panic!("Expected Csv command"),
        }
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["reqkit", "http://example.com"]).is_err());
    }

    #[test]
    fn test_parse_pair_and_header() {
        assert_eq!(
            parse_pair("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_pair("novalue").is_err());
        assert_eq!(
            parse_header("X-Id:  42 ").unwrap(),
            ("X-Id".to_string(), "42".to_string())
        );
        assert!(parse_header(": x").is_err());
        assert!(parse_header("plain").is_err());
    }

    #[test]
    fn test_request_args_options() {
        let cli = Cli::try_parse_from([
            "reqkit",
            "get",
            "http://example.com/",
            "--timeout",
            "0.5",
            "--retry-delay",
            "0",
            "--no-follow",
            "-b",
            "a=1",
        ])
        .unwrap();
        let Commands::Get(args) = cli.command else {
            panic!("Expected Get command");
        };
        let options = args.request.options();
        assert_eq!(options.timeout, 0.5);
        assert_eq!(options.retry_delay, Duration::ZERO);
        assert_eq!(options.overrides.follow_redirects, Some(false));
        assert_eq!(options.cookie_header().as_deref(), Some("a=1"));
    }
}
