pub mod client;
pub mod html;
pub mod index;
pub mod lexer;
pub mod server;

use anyhow::Context;
use indicatif::ProgressBar;
use rand::Rng;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use stop_words::LANGUAGE;

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::index::LineIndex;
use crate::lexer::Lexer;

pub struct Config {
    pub filepath: PathBuf,
    pub index_path: PathBuf,
    pub dump_format: DumpFormat,
    pub verify: bool,
    pub sender: Arc<Mutex<Sender<String>>>,
}

pub enum DumpFormat {
    Json,
    Bytes,
}

#[derive(Clone)]
pub enum ErrorHandler {
    Stderr,
    File(PathBuf),
}

/// Tokenizes a search term and runs it against the index dumped at
/// `index_file`. Hits are line texts, best match first.
pub fn search_index(term: &str, index_file: &Path) -> anyhow::Result<Vec<String>> {
    let text_chars = term.chars().collect::<Vec<char>>();
    let stop_words = stop_words::get(LANGUAGE::English);
    let tokens = Lexer::new(&text_chars).get_tokens(&stop_words);
    let index = load_index(index_file).context("load index")?;
    Ok(index.search(&tokens, usize::MAX))
}

/// Builds the index for the configured source file and writes the dump.
///
/// Every non-empty line of the source becomes one document. Lines are
/// tokenized in parallel, then folded into the index in source order so a
/// line's position is stable across runs. An up-to-date existing dump for the
/// same source is left alone.
pub fn index_lines(cfg: &Config) -> anyhow::Result<()> {
    if let Ok(existing) = load_index(&cfg.index_path)
        && existing.source == cfg.filepath
        && existing.is_fresh() == Some(true)
    {
        println!("Index is up to date, nothing to do.");
        return Ok(());
    }

    let _ = cfg
        .sender
        .lock()
        .unwrap()
        .send(format!("Indexing {:?}", cfg.filepath));
    let content = fs::read_to_string(&cfg.filepath).context("read source file")?;
    let lines = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<&str>>();

    let stop_words = stop_words::get(LANGUAGE::English);
    let bar = ProgressBar::new(lines.len() as u64);
    let token_lists = lines
        .par_iter()
        .map(|line| {
            let text_chars = line.chars().collect::<Vec<char>>();
            let tokens = Lexer::new(&text_chars).get_tokens(&stop_words);
            bar.inc(1);
            tokens
        })
        .collect::<Vec<Vec<String>>>();
    bar.finish_and_clear();

    let mut index = LineIndex::new(&cfg.filepath);
    for (line, tokens) in lines.iter().zip(&token_lists) {
        index.add_line(line, tokens);
    }
    index.finish();

    let word_count: usize = token_lists.iter().map(|t| t.len()).sum();
    println!(
        "Indexed {lines} line{s} ({word_count} words)",
        lines = lines.len(),
        s = if lines.len() == 1 { "" } else { "s" }
    );

    if cfg.verify {
        verify_index(&index, &lines, &token_lists)?;
    }

    println!("Writing into {:?}...", cfg.index_path);
    let file = BufWriter::new(File::create(&cfg.index_path).context("create index file")?);
    match cfg.dump_format {
        DumpFormat::Json => {
            serde_json::to_writer(file, &index).context("serialize index into json")?
        }
        DumpFormat::Bytes => {
            bincode2::serialize_into(file, &index).context("serialize index into bytes")?
        }
    };

    Ok(())
}

/// Self-test borrowed from the indexing pipeline's early days: pick one kept
/// token at random (reservoir sampling so every candidate is equally likely),
/// search for it, and confirm the line it came from is among the hits.
///
/// A token present in every line carries a zero idf weight and can never come
/// back as a hit, so sampling is limited to tokens that miss at least one
/// line. When no such token exists (a single-line source, say) there is
/// nothing meaningful to check and verification is skipped.
fn verify_index(index: &LineIndex, lines: &[&str], token_lists: &[Vec<String>]) -> anyhow::Result<()> {
    let total_lines = token_lists.len();
    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in token_lists {
        let mut seen_in_line = HashSet::new();
        for token in tokens {
            if seen_in_line.insert(token.as_str()) {
                *doc_freq.entry(token.as_str()).or_insert(0) += 1;
            }
        }
    }

    let mut rng = rand::thread_rng();
    let mut sampled: Option<(usize, String)> = None;
    let mut seen = 0usize;

    for (line_no, tokens) in token_lists.iter().enumerate() {
        for token in tokens {
            if doc_freq.get(token.as_str()) == Some(&total_lines) {
                continue;
            }
            seen += 1;
            if rng.gen_range(0..seen) == 0 {
                sampled = Some((line_no, token.clone()));
            }
        }
    }

    let Some((line_no, token)) = sampled else {
        println!("Skipping verification: no token distinguishes any line");
        return Ok(());
    };

    let hits = index.search(std::slice::from_ref(&token), usize::MAX);
    let found = hits.iter().any(|hit| hit == lines[line_no]);
    anyhow::ensure!(
        found,
        "verification failed: line {line_no} not found for sampled token {token:?}"
    );
    println!("Index verified with sampled token {token:?}");
    Ok(())
}

/// Reads an index dump, accepting either format; a json dump starts with `{`,
/// anything else is treated as bytes.
pub fn load_index(filepath: &Path) -> anyhow::Result<LineIndex> {
    let mut reader = BufReader::new(File::open(filepath).context("open index file")?);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read index file")?;

    let index: LineIndex = match buf.first() {
        Some(b'{') => serde_json::from_slice(&buf).context("deserialize index from json")?,
        Some(_) => bincode2::deserialize(&buf).context("deserialize index from bytes")?,
        None => anyhow::bail!("index file is empty"),
    };

    Ok(index)
}

/// Drains diagnostic messages until every sender is gone, writing them to
/// stderr or appending to a log file.
pub fn handle_messages(receiver: &Receiver<String>, error_handler: ErrorHandler) -> anyhow::Result<()> {
    match error_handler {
        ErrorHandler::Stderr => {
            while let Ok(message) = receiver.recv() {
                eprintln!("{message}");
            }
        }
        ErrorHandler::File(f) => {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&f)
                .context("opening log file")?;
            let mut writer = BufWriter::new(file);

            while let Ok(message) = receiver.recv() {
                writeln!(writer, "{message}").context("write to log file")?;
                writer.flush().context("flush log file")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("concord_{}_{name}", std::process::id()))
    }

    fn write_source(name: &str) -> PathBuf {
        let path = temp_path(name);
        fs::write(
            &path,
            "the lady doth protest too much\n\nbrevity is the soul of wit\nsomething wicked this way comes\n",
        )
        .unwrap();
        path
    }

    fn config(source: PathBuf, index_name: &str, dump_format: DumpFormat) -> Config {
        let (sender, _receiver) = mpsc::channel();
        Config {
            filepath: source,
            index_path: temp_path(index_name),
            dump_format,
            verify: true,
            sender: Arc::new(Mutex::new(sender)),
        }
    }

    #[test]
    fn index_then_search_round_trip() {
        let source = write_source("round_trip.txt");
        let cfg = config(source.clone(), "round_trip.json", DumpFormat::Json);

        index_lines(&cfg).unwrap();
        let hits = search_index("brevity", &cfg.index_path).unwrap();
        assert_eq!(hits, vec!["brevity is the soul of wit"]);

        let index = load_index(&cfg.index_path).unwrap();
        assert_eq!(index.lines.len(), 3);
        assert_eq!(index.is_fresh(), Some(true));

        let _ = fs::remove_file(&source);
        let _ = fs::remove_file(&cfg.index_path);
    }

    #[test]
    fn bytes_dump_is_sniffed_on_load() {
        let source = write_source("bytes_dump.txt");
        let cfg = config(source.clone(), "bytes_dump.bin", DumpFormat::Bytes);

        index_lines(&cfg).unwrap();
        let hits = search_index("wicked", &cfg.index_path).unwrap();
        assert_eq!(hits, vec!["something wicked this way comes"]);

        let _ = fs::remove_file(&source);
        let _ = fs::remove_file(&cfg.index_path);
    }

    #[test]
    fn fresh_index_is_not_rebuilt() {
        let source = write_source("fresh.txt");
        let cfg = config(source.clone(), "fresh.json", DumpFormat::Json);

        index_lines(&cfg).unwrap();
        let first = fs::read(&cfg.index_path).unwrap();
        index_lines(&cfg).unwrap();
        let second = fs::read(&cfg.index_path).unwrap();
        // Second run hits the freshness check and leaves the dump untouched,
        // including its built_at stamp.
        assert_eq!(first, second);

        let _ = fs::remove_file(&source);
        let _ = fs::remove_file(&cfg.index_path);
    }

    #[test]
    fn verify_tolerates_single_line_source() {
        // Every token of a one-line file appears in its only line, so all idf
        // weights are zero and no search can return it. Verification must
        // skip instead of reporting a failure.
        let source = temp_path("single_line.txt");
        fs::write(&source, "all the world is a stage\n").unwrap();
        let cfg = config(source.clone(), "single_line.json", DumpFormat::Json);

        index_lines(&cfg).unwrap();

        let _ = fs::remove_file(&source);
        let _ = fs::remove_file(&cfg.index_path);
    }

    #[test]
    fn missing_index_file_is_an_error() {
        assert!(load_index(Path::new("concord_no_such_index.json")).is_err());
    }
}
