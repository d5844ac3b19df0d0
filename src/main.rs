use clap::{Parser, Subcommand};

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use concord::client::SearchForm;
use concord::{Config, DumpFormat, ErrorHandler, handle_messages, index_lines, search_index};

#[derive(Parser)]
#[command(name = "concord", version, about)]
struct Cli {
    /// Append diagnostics to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an index from a text file, one document per non-empty line
    Index {
        file: PathBuf,

        /// Where to write the index dump
        #[arg(short, long, default_value = "index.json")]
        index_path: PathBuf,

        /// Dump the index as bincode bytes instead of json
        #[arg(long)]
        bytes: bool,

        /// After the build, search for a sampled token and confirm its line
        /// is found
        #[arg(long)]
        verify: bool,
    },
    /// Search the index and print matching lines, best match first
    Search {
        term: String,

        #[arg(short, long, default_value = "index.json")]
        index_path: PathBuf,
    },
    /// Serve the index over http
    Serve {
        #[arg(short, long, default_value = "index.json")]
        index_path: PathBuf,

        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
    /// Query a running server through the search form client
    Query {
        term: String,

        /// Server root
        #[arg(long, default_value = "http://localhost:8080")]
        url: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let error_handler = match &cli.log_file {
        Some(path) => ErrorHandler::File(path.clone()),
        None => ErrorHandler::Stderr,
    };
    let (sender, receiver) = mpsc::channel();
    let sender = Arc::new(Mutex::new(sender));
    let drain = thread::spawn(move || {
        let _ = handle_messages(&receiver, error_handler);
    });

    let result = match cli.command {
        Command::Index {
            file,
            index_path,
            bytes,
            verify,
        } => {
            let cfg = Config {
                filepath: file,
                index_path,
                dump_format: if bytes {
                    DumpFormat::Bytes
                } else {
                    DumpFormat::Json
                },
                verify,
                sender: Arc::clone(&sender),
            };
            index_lines(&cfg)
        }
        Command::Search { term, index_path } => {
            let hits = search_index(&term, &index_path)?;
            if hits.is_empty() {
                println!("No Matches!");
            }
            for hit in hits {
                println!("{hit}");
            }
            Ok(())
        }
        Command::Serve { index_path, port } => {
            concord::server::serve(&index_path, port, Arc::clone(&sender))
        }
        Command::Query { term, url } => {
            let mut form = SearchForm::new(&url, Arc::clone(&sender));
            let seq = form.submit(&term);
            form.wait(seq)?;
            for item in form.items() {
                println!("{item}");
            }
            Ok(())
        }
    };

    // With the last sender gone the drain thread sees the channel close and
    // exits once the final message is written.
    drop(sender);
    let _ = drain.join();
    result
}
