use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

/// Shown as the only list item when a search succeeds with zero hits.
pub const NO_MATCH_MESSAGE: &str = "No match is found.";

/// Shown as the only list item when a search fails for any reason.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error captured and will be fixed soon.";

enum Outcome {
    Hits(Vec<String>),
    Failed,
}

struct Completion {
    seq: u64,
    outcome: Outcome,
}

/// Drives the search form cycle against a running server: each submission
/// issues `GET /api/search?q=<query>` on a worker thread and, once the
/// response lands, rewrites the owned result list with exactly one of the hit
/// items, [`NO_MATCH_MESSAGE`] or [`INTERNAL_ERROR_MESSAGE`].
///
/// Submissions are tagged with a monotonically increasing sequence number so
/// that a response overtaken by a later submission's response is discarded
/// instead of clobbering the newer rendering.
pub struct SearchForm {
    base_url: String,
    next_seq: u64,
    last_applied: u64,
    items: Vec<String>,
    completion_tx: Sender<Completion>,
    completions: Receiver<Completion>,
    err_handler: Arc<Mutex<Sender<String>>>,
}

impl SearchForm {
    /// `base_url` addresses the server root without a trailing slash, e.g.
    /// `http://localhost:8080`.
    pub fn new(base_url: &str, err_handler: Arc<Mutex<Sender<String>>>) -> Self {
        let (completion_tx, completions) = mpsc::channel();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            next_seq: 1,
            last_applied: 0,
            items: Vec::new(),
            completion_tx,
            completions,
            err_handler,
        }
    }

    /// Submits a query. The request runs on its own thread; the calling thread
    /// is never suspended. Returns the submission's sequence number.
    pub fn submit(&mut self, query: &str) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        let url = format!(
            "{base}/api/search?q={q}",
            base = self.base_url,
            q = utf8_percent_encode(query, NON_ALPHANUMERIC),
        );
        let tx = self.completion_tx.clone();
        let err_handler = Arc::clone(&self.err_handler);

        thread::spawn(move || {
            let outcome = match fetch_results(&url) {
                Ok(hits) => Outcome::Hits(hits),
                Err(err) => {
                    let _ = err_handler
                        .lock()
                        .unwrap()
                        .send(format!("Search request failed: {err}"));
                    Outcome::Failed
                }
            };
            let _ = tx.send(Completion { seq, outcome });
        });

        seq
    }

    /// Applies every completion that has already arrived, without blocking.
    pub fn apply_completions(&mut self) {
        loop {
            let next = self.completions.try_recv();
            match next {
                Ok(completion) => self.apply(completion),
                Err(_) => break,
            }
        }
    }

    /// Blocks until the completion for `seq` has been applied or discarded.
    pub fn wait(&mut self, seq: u64) -> anyhow::Result<()> {
        loop {
            let completion = self
                .completions
                .recv()
                .context("completion channel closed")?;
            let done = completion.seq == seq;
            self.apply(completion);
            if done {
                return Ok(());
            }
        }
    }

    /// The rendered result list after the last applied completion.
    pub fn items(&self) -> &[String] {
        &self.items
    }

    fn apply(&mut self, completion: Completion) {
        if completion.seq < self.last_applied {
            let _ = self.err_handler.lock().unwrap().send(format!(
                "Discarding stale response {seq}",
                seq = completion.seq
            ));
            return;
        }
        self.last_applied = completion.seq;

        self.items.clear();
        match completion.outcome {
            Outcome::Failed => self.items.push(INTERNAL_ERROR_MESSAGE.to_string()),
            Outcome::Hits(hits) if hits.is_empty() => {
                self.items.push(NO_MATCH_MESSAGE.to_string());
            }
            Outcome::Hits(hits) => {
                for hit in hits {
                    let _ = self.err_handler.lock().unwrap().send(hit.clone());
                    self.items.push(hit);
                }
            }
        }
    }
}

fn fetch_results(url: &str) -> anyhow::Result<Vec<String>> {
    let response = reqwest::blocking::get(url).context("send search request")?;
    let response = response.error_for_status().context("search status")?;
    // A json `null` counts as an absent result set, not an error.
    let hits = response
        .json::<Option<Vec<String>>>()
        .context("decode search hits")?;
    Ok(hits.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_form() -> (SearchForm, Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        // Port 9 (discard) so accidental real requests cannot succeed.
        let form = SearchForm::new("http://127.0.0.1:9", Arc::new(Mutex::new(tx)));
        (form, rx)
    }

    fn hits(seq: u64, items: &[&str]) -> Completion {
        Completion {
            seq,
            outcome: Outcome::Hits(items.iter().map(|i| i.to_string()).collect()),
        }
    }

    #[test]
    fn hits_render_in_response_order() {
        let (mut form, _rx) = test_form();
        form.apply(hits(1, &["rust-lang", "rustup"]));
        assert_eq!(form.items(), ["rust-lang", "rustup"]);
    }

    #[test]
    fn empty_response_renders_no_match_item() {
        let (mut form, _rx) = test_form();
        form.apply(hits(1, &[]));
        assert_eq!(form.items(), [NO_MATCH_MESSAGE]);
    }

    #[test]
    fn failure_renders_internal_error_item() {
        let (mut form, _rx) = test_form();
        form.apply(Completion {
            seq: 1,
            outcome: Outcome::Failed,
        });
        assert_eq!(form.items(), [INTERNAL_ERROR_MESSAGE]);
    }

    #[test]
    fn new_completion_replaces_prior_items() {
        let (mut form, _rx) = test_form();
        form.apply(hits(1, &["first", "second"]));
        form.apply(hits(2, &[]));
        assert_eq!(form.items(), [NO_MATCH_MESSAGE]);

        form.apply(hits(3, &["third"]));
        assert_eq!(form.items(), ["third"]);
    }

    #[test]
    fn stale_completion_is_discarded() {
        let (mut form, _rx) = test_form();
        form.apply(hits(2, &["newer"]));
        form.apply(hits(1, &["older"]));
        assert_eq!(form.items(), ["newer"]);
    }

    #[test]
    fn rendered_hits_are_echoed_to_diagnostics() {
        let (mut form, rx) = test_form();
        form.apply(hits(1, &["rust-lang", "rustup"]));
        assert_eq!(rx.try_recv().unwrap(), "rust-lang");
        assert_eq!(rx.try_recv().unwrap(), "rustup");
    }

    #[test]
    fn apply_completions_drains_arrived_responses() {
        let (mut form, _rx) = test_form();
        form.submit("rust");
        assert!(form.items().is_empty());

        // Nothing listens on the discard port, so the refused connection
        // completes quickly; poll without blocking until it lands.
        for _ in 0..500 {
            form.apply_completions();
            if !form.items().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(form.items(), [INTERNAL_ERROR_MESSAGE]);
    }

    #[test]
    fn sequence_numbers_increase_per_submission() {
        let (mut form, _rx) = test_form();
        let first = form.submit("rust");
        let second = form.submit("rust");
        assert!(second > first);
    }
}
