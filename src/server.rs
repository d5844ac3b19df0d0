use tiny_http::{Header, Method, Response, Server};

use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use percent_encoding::percent_decode_str;

use crate::html::SEARCH_PAGE;
use crate::index::LineIndex;
use crate::lexer::Lexer;
use crate::load_index;

/// Cap on hits returned per query.
pub const MAX_HITS: usize = 100;

/// Loads the index and serves it on `localhost:<port>` until the process is
/// killed.
pub fn serve(index_file: &Path, port: u16, err_handler: Arc<Mutex<Sender<String>>>) -> anyhow::Result<()> {
    let index = load_index(index_file)?;
    let addr = format!("localhost:{port}");
    let server = Server::http(&addr)
        .map_err(|err| anyhow::anyhow!("bind server to {addr}: {err}"))?;
    println!("Server listening on {addr}");

    run_server(&server, &index, err_handler);
    Ok(())
}

/// The request loop, separated from [`serve`] so tests can bind their own
/// listener.
pub fn run_server(server: &Server, index: &LineIndex, err_handler: Arc<Mutex<Sender<String>>>) {
    let stop_words = stop_words::get(stop_words::LANGUAGE::English);

    for request in server.incoming_requests() {
        let _ = err_handler.lock().unwrap().send(format!(
            "{method} {url}",
            method = request.method(),
            url = request.url()
        ));

        if *request.method() != Method::Get {
            let response = Response::from_string(format!(
                "Method Not Allowed: {method}",
                method = request.method()
            ));
            let _ = request.respond(response.with_status_code(403));
            continue;
        }

        let url = request.url().to_string();
        let path = url.split_once('?').map_or(url.as_str(), |(path, _)| path);
        match path {
            "/" => {
                let header = Header::from_bytes("Content-Type", "text/html").unwrap();
                let response = Response::from_string(SEARCH_PAGE).with_header(header);
                let _ = request.respond(response);
            }
            "/api/search" => {
                let query = query_param(&url);
                let text_chars = query.chars().collect::<Vec<char>>();
                let tokens = Lexer::new(&text_chars).get_tokens(&stop_words);
                let hits = index.search(&tokens, MAX_HITS);

                match serde_json::to_string(&hits) {
                    Ok(body) => {
                        let header =
                            Header::from_bytes("Content-Type", "application/json").unwrap();
                        let response = Response::from_string(body).with_header(header);
                        let _ = request.respond(response);
                    }
                    Err(err) => {
                        let _ = err_handler
                            .lock()
                            .unwrap()
                            .send(format!("Failed to encode hits: {err}"));
                        let _ = request.respond(Response::empty(500));
                    }
                }
            }
            _ => {
                let response = Response::from_string(format!("Route not Allowed: {url}"));
                let _ = request.respond(response.with_status_code(404));
            }
        }
    }
}

/// Pulls the raw `q` value out of a request url, percent-decoded with `+`
/// treated as space. A missing parameter is an empty query.
fn query_param(url: &str) -> String {
    let Some((_, query)) = url.split_once('?') else {
        return String::new();
    };

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == "q" {
            let value = value.replace('+', " ");
            return percent_decode_str(&value).decode_utf8_lossy().to_string();
        }
    }

    String::new()
}
