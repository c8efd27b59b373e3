use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serpsim_core::{parse_locations, split_list, Credentials, ExtractMode, RequestShape, SearchTarget};
use serpsim_local::dataforseo::{self, DataForSeoProvider};
use serpsim_local::{RunConfig, TfidfConfig};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

mod logging;
mod report;

#[derive(Parser, Debug)]
#[command(name = "serpsim")]
#[command(
    about = "Compare answer boxes / AI overviews for a keyword across SERP locations",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query DataForSEO per keyword, compare the snippets, and export CSVs.
    Run(RunCmd),
    /// Offline TF-IDF cosine similarity over the given texts (json).
    Similarity(SimilarityCmd),
    /// Diagnose configuration issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct RunCmd {
    /// Keywords, `;`-separated.
    #[arg(long)]
    keywords: String,
    /// Locations, `;`-separated. All-digit entries are DataForSEO location codes.
    #[arg(long, default_value = "United States")]
    locations: String,
    #[arg(long, default_value = "google.com")]
    domain: String,
    #[arg(long, default_value = "en")]
    language: String,
    /// Country (`gl`). Pass an empty string to omit it.
    #[arg(long, default_value = "us")]
    country: String,
    #[arg(long, default_value = "desktop")]
    device: String,
    #[arg(long, default_value = "windows")]
    os: String,
    /// API calls per keyword (1..=10); locations rotate across calls.
    #[arg(long, default_value_t = 1)]
    calls: usize,
    /// Element to compare. Allowed: answer-box, ai-overview
    #[arg(long, default_value = "answer-box")]
    mode: String,
    /// Allowed: single (one POST per call), multi (one POST per keyword)
    #[arg(long, default_value = "single")]
    request_shape: String,
    #[arg(long, env = "SERPSIM_DATAFORSEO_LOGIN", hide_env_values = true)]
    login: Option<String>,
    #[arg(long, env = "SERPSIM_DATAFORSEO_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Override the live/advanced SERP endpoint.
    #[arg(long, env = "SERPSIM_DATAFORSEO_ENDPOINT")]
    endpoint: Option<String>,
    /// Per-request timeout (ms).
    #[arg(long, default_value_t = 60_000)]
    timeout_ms: u64,
    /// Log request parameters and per-call outcomes to stderr.
    #[arg(long)]
    verbose: bool,
    /// Also write every fetched response to `raw_responses.json`.
    #[arg(long)]
    export_raw: bool,
    #[arg(long, default_value = ".generated")]
    out_dir: PathBuf,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Shortest token (chars) kept by the tokenizer.
    #[arg(long, default_value_t = 2)]
    min_token_chars: usize,
    /// Comma-separated words to ignore when comparing.
    #[arg(long)]
    stop_words: Option<String>,
    /// Override "now" for deterministic outputs.
    #[arg(long)]
    now_epoch_s: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct SimilarityCmd {
    /// Text to compare (repeatable).
    #[arg(long)]
    text: Vec<String>,
    /// File with one text per line (blank lines and #comments ignored).
    #[arg(long)]
    texts_file: Vec<PathBuf>,
    #[arg(long, default_value_t = 2)]
    min_token_chars: usize,
    #[arg(long)]
    stop_words: Option<String>,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Directory that `run` would export into.
    #[arg(long, default_value = ".generated")]
    out_dir: PathBuf,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

// Opt-in (SERPSIM_ENV_FILE). Sets vars only if not already set; never logs values.
fn load_env_file() {
    let Ok(p) = std::env::var("SERPSIM_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
}

fn now_epoch_s() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn tfidf_config(min_token_chars: usize, stop_words: Option<&str>) -> TfidfConfig {
    let stop_words: BTreeSet<String> = stop_words
        .map(|s| split_list(s, ',').into_iter().map(|w| w.to_lowercase()).collect())
        .unwrap_or_default();
    TfidfConfig {
        min_token_chars: min_token_chars.max(1),
        stop_words,
    }
}

fn nonempty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn resolve_credentials(login: Option<String>, password: Option<String>) -> Result<Credentials> {
    let login = nonempty(login)
        .or_else(dataforseo::login_from_env)
        .context("missing DataForSEO login: pass --login or set SERPSIM_DATAFORSEO_LOGIN (or DATAFORSEO_LOGIN)")?;
    let password = nonempty(password)
        .or_else(dataforseo::password_from_env)
        .context("missing DataForSEO password: pass --password or set SERPSIM_DATAFORSEO_PASSWORD (or DATAFORSEO_PASSWORD)")?;
    Ok(Credentials::new(login, password))
}

fn run_config(args: &RunCmd) -> Result<RunConfig> {
    let mode: ExtractMode = args.mode.parse()?;
    let shape: RequestShape = args.request_shape.parse()?;
    let country = Some(args.country.trim().to_string()).filter(|c| !c.is_empty());
    let cfg = RunConfig {
        keywords: split_list(&args.keywords, ';'),
        locations: parse_locations(&args.locations, ';'),
        target: SearchTarget {
            domain: args.domain.clone(),
            language: args.language.clone(),
            country,
            device: args.device.clone(),
            os: args.os.clone(),
        },
        calls: args.calls,
        mode,
        shape,
        keep_raw: args.export_raw,
        tfidf: tfidf_config(args.min_token_chars, args.stop_words.as_deref()),
    };
    cfg.validate()?;
    Ok(cfg)
}

async fn cmd_run(args: RunCmd) -> Result<()> {
    let cfg = run_config(&args)?;
    let credentials = resolve_credentials(args.login.clone(), args.password.clone())?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("serpsim/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")?;
    let mut provider =
        DataForSeoProvider::new(client, credentials).with_timeout_ms(args.timeout_ms);
    if let Some(ep) = nonempty(args.endpoint.clone()) {
        provider = provider.with_endpoint(ep);
    }
    tracing::debug!(endpoint = provider.endpoint(), keywords = cfg.keywords.len(), "starting run");

    let report = serpsim_local::run(&provider, &cfg).await;
    let exports = serpsim_local::export::write_exports(&report, &args.out_dir, args.export_raw)?;
    if exports.is_empty() {
        tracing::info!("nothing to export");
    }

    match args.output.to_ascii_lowercase().as_str() {
        "text" => print!("{}", report::run_text(&report, &cfg, &exports)),
        _ => {
            let now = args.now_epoch_s.unwrap_or_else(now_epoch_s);
            let v = report::run_json(&report, &cfg, "dataforseo", now, &exports);
            println!("{v}");
        }
    }
    Ok(())
}

fn load_texts(files: &[PathBuf], inline: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = inline.to_vec();
    for p in files {
        let txt = std::fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
        out.extend(
            txt.lines()
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(out)
}

fn cmd_similarity(args: SimilarityCmd) -> Result<()> {
    let texts = load_texts(&args.texts_file, &args.text)?;
    let cfg = tfidf_config(args.min_token_chars, args.stop_words.as_deref());
    let v = match serpsim_local::similarity_matrix(texts.as_slice(), &cfg) {
        Ok(m) => serde_json::json!({
            "schema_version": 1,
            "kind": "similarity",
            "ok": true,
            "n": m.len(),
            "matrix": m.rows(),
        }),
        Err(e) => serde_json::json!({
            "schema_version": 1,
            "kind": "similarity",
            "ok": false,
            "n": texts.len(),
            "matrix": serde_json::Value::Null,
            "error": {
                "code": e.code(),
                "message": e.to_string(),
                "hint": report::notice_hint(e.code()).unwrap_or(""),
            },
        }),
    };
    println!("{v}");
    Ok(())
}

fn dir_writable(dir: &Path) -> bool {
    (|| -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let probe = dir.join(format!("serpsim-doctor-{}.probe", std::process::id()));
        std::fs::write(&probe, b"ok")?;
        let _ = std::fs::remove_file(&probe);
        Ok(())
    })()
    .is_ok()
}

fn cmd_doctor(args: DoctorCmd) {
    let t0 = std::time::Instant::now();

    // Booleans only; never print values.
    let login = dataforseo::login_from_env().is_some();
    let password = dataforseo::password_from_env().is_some();
    let endpoint_override = dataforseo::endpoint_from_env();

    let mut checks: Vec<serde_json::Value> = Vec::new();
    let creds_ok = login && password;
    checks.push(serde_json::json!({
        "name": "dataforseo_credentials",
        "ok": creds_ok,
        "message": if creds_ok { "credentials configured" } else { "credentials missing" },
        "hint": if creds_ok { "" } else { "Set SERPSIM_DATAFORSEO_LOGIN and SERPSIM_DATAFORSEO_PASSWORD (or DATAFORSEO_LOGIN / DATAFORSEO_PASSWORD)." },
    }));
    let out_ok = dir_writable(&args.out_dir);
    checks.push(serde_json::json!({
        "name": "out_dir_writable",
        "ok": out_ok,
        "message": if out_ok { "output dir is writable" } else { "output dir is not writable" },
        "hint": if out_ok { "" } else { "Pass --out-dir with a writable directory." },
    }));

    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "serpsim",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "dataforseo": {
                "login": login,
                "password": password,
                "endpoint": endpoint_override.as_deref().unwrap_or(dataforseo::DEFAULT_ENDPOINT),
                "endpoint_overridden": endpoint_override.is_some(),
            },
            "out_dir": args.out_dir.to_string_lossy().to_string(),
        },
        "checks": checks,
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("serpsim {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
            println!("endpoint: {}", payload["configured"]["dataforseo"]["endpoint"].as_str().unwrap_or(""));
            println!("dataforseo: login={} password={}", login, password);
            println!("checks:");
            for c in &checks {
                let name = c["name"].as_str().unwrap_or("?");
                let ok = c["ok"].as_bool().unwrap_or(false);
                println!("- {}: {}", name, if ok { "ok" } else { "fail" });
            }
        }
        _ => println!("{payload}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();

    let cli = Cli::parse();
    let verbose = matches!(&cli.command, Commands::Run(a) if a.verbose);
    logging::configure_logging(verbose);

    match cli.command {
        Commands::Run(args) => cmd_run(args).await?,
        Commands::Similarity(args) => cmd_similarity(args)?,
        Commands::Doctor(args) => cmd_doctor(args),
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "serpsim",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("serpsim {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_run(extra: &[&str]) -> RunCmd {
        let mut argv = vec!["serpsim", "run", "--keywords", "bora bora; maldives"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(a) => a,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_config_splits_lists_and_codes() {
        let a = parse_run(&["--locations", "Austin, Texas, United States;2840", "--calls", "3"]);
        let cfg = run_config(&a).unwrap();
        assert_eq!(cfg.keywords, vec!["bora bora", "maldives"]);
        assert_eq!(cfg.locations.len(), 2);
        assert_eq!(cfg.locations[1], serpsim_core::Location::Code(2840));
        assert_eq!(cfg.calls, 3);
        assert_eq!(cfg.target.country.as_deref(), Some("us"));
        assert_eq!(cfg.mode, ExtractMode::AnswerBox);
    }

    #[test]
    fn empty_country_is_omitted() {
        let a = parse_run(&["--country", ""]);
        assert!(run_config(&a).unwrap().target.country.is_none());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(run_config(&parse_run(&["--calls", "11"])).is_err());
        assert!(run_config(&parse_run(&["--mode", "knowledge-graph"])).is_err());
        assert!(run_config(&parse_run(&["--request-shape", "batch"])).is_err());
        assert!(run_config(&parse_run(&["--locations", " ; "])).is_err());
    }

    #[test]
    fn stop_words_are_lowercased() {
        let cfg = tfidf_config(0, Some("The, OF"));
        assert_eq!(cfg.min_token_chars, 1);
        assert!(cfg.stop_words.contains("the"));
        assert!(cfg.stop_words.contains("of"));
    }

    #[test]
    fn texts_file_skips_blank_and_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("texts.txt");
        std::fs::write(&p, "# header\nfirst text\n\n  second text  \n").unwrap();
        let texts = load_texts(&[p], &["inline".to_string()]).unwrap();
        assert_eq!(texts, vec!["inline", "first text", "second text"]);
    }
}
