//! CLI entry point — reads a conversation (file or stdin), runs the
//! pipeline, persists the result and audit trail, prints the result JSON.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use clinscribe::audit::{AuditSink, JsonlAuditSink, MultiSink, SqliteAuditSink};
use clinscribe::config::{self, PipelineConfig};
use clinscribe::db;
use clinscribe::pipeline::extraction::HttpExtractorClient;
use clinscribe::pipeline::{PipelineResult, ScribePipeline};

struct CliArgs {
    batch: bool,
    database_path: PathBuf,
    input_path: Option<PathBuf>,
}

fn parse_args() -> Result<CliArgs, String> {
    let mut batch = false;
    let mut database_path = config::default_database_path();
    let mut input_path = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--batch" => batch = true,
            "--db" => {
                let path = args.next().ok_or("--db requires a path")?;
                database_path = PathBuf::from(path);
            }
            "--help" | "-h" => {
                println!(
                    "Usage: clinscribe [--batch] [--db PATH] [FILE]\n\
                     Reads a clinical conversation from FILE (or stdin) and prints the\n\
                     processing result as JSON. With --batch, conversations are separated\n\
                     by lines containing only '---'.\n\
                     {} v{}",
                    config::APP_NAME,
                    config::APP_VERSION
                );
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown option: {other}"));
            }
            other => input_path = Some(PathBuf::from(other)),
        }
    }

    Ok(CliArgs {
        batch,
        database_path,
        input_path,
    })
}

fn read_input(path: Option<&PathBuf>) -> std::io::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// Split batch input on lines containing only `---`.
fn split_batch(input: &str) -> Vec<String> {
    input
        .split("\n---\n")
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn persist_results(
    database_path: &PathBuf,
    results: &[PipelineResult],
) -> Result<(), db::DatabaseError> {
    let conn = db::sqlite::open_database(database_path)?;
    for result in results {
        db::repository::insert_pipeline_result(&conn, result)?;
    }
    Ok(())
}

fn run() -> Result<ExitCode, String> {
    let args = parse_args()?;
    let input = read_input(args.input_path.as_ref())
        .map_err(|e| format!("failed to read input: {e}"))?;

    let pipeline_config = PipelineConfig::from_env();
    let extractor = HttpExtractorClient::new(
        &pipeline_config.extractor_base_url,
        &pipeline_config.extractor_model,
        pipeline_config.extractor_timeout_secs,
    )
    .map_err(|e| format!("failed to build extraction client: {e}"))?;

    let jsonl_sink = JsonlAuditSink::open(&config::default_audit_log_path())
        .map_err(|e| format!("failed to open audit log: {e}"))?;
    let sqlite_sink = SqliteAuditSink::new(
        db::sqlite::open_database(&args.database_path)
            .map_err(|e| format!("failed to open database: {e}"))?,
    );
    let audit: Arc<dyn AuditSink> = Arc::new(MultiSink::new(vec![
        Box::new(jsonl_sink),
        Box::new(sqlite_sink),
    ]));

    let pipeline = ScribePipeline::new(Box::new(extractor), audit, pipeline_config);

    let results = if args.batch {
        pipeline.process_batch(&split_batch(&input))
    } else {
        vec![pipeline.process(&input)]
    };

    persist_results(&args.database_path, &results)
        .map_err(|e| format!("failed to persist results: {e}"))?;

    let output = if args.batch {
        serde_json::to_string_pretty(&results)
    } else {
        serde_json::to_string_pretty(&results[0])
    }
    .map_err(|e| format!("failed to serialize results: {e}"))?;
    println!("{output}");

    let all_succeeded = results.iter().all(|r| r.success);
    Ok(if all_succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_split_on_separator_lines() {
        let input = "First conversation text.\n---\nSecond conversation text.\n---\n";
        let parts = split_batch(input);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "First conversation text.");
        assert_eq!(parts[1], "Second conversation text.");
    }

    #[test]
    fn batch_split_single_conversation() {
        let parts = split_batch("Only one conversation here.");
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn batch_split_drops_empty_segments() {
        let parts = split_batch("\n---\nOnly real content\n---\n\n---\n");
        assert_eq!(parts, vec!["Only real content".to_string()]);
    }
}
