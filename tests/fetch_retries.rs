use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use matchday_loader::config::Config;
use matchday_loader::provider::{ApiClient, Sleeper};

/// Captures requested sleep durations instead of blocking, so retry timing
/// is asserted without real delays.
#[derive(Default)]
struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    fn secs(&self) -> Vec<f64> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_secs_f64())
            .collect()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, dur: Duration) {
        self.0.lock().unwrap().push(dur);
    }
}

/// Serves one scripted response per incoming connection, then stops.
/// Returns the base url and a handle yielding the raw request heads seen.
fn serve_scripted(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().expect("accept connection");
            let mut head = String::new();
            let mut buf = [0u8; 4096];
            while !head.contains("\r\n\r\n") {
                let n = stream.read(&mut buf).expect("read request");
                if n == 0 {
                    break;
                }
                head.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
            seen.push(head);
            stream.write_all(response.as_bytes()).expect("write response");
        }
        seen
    });
    (format!("http://{addr}"), handle)
}

fn response(status_line: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
        body.len()
    )
}

fn client_for(base_url: String, max_retries: u32) -> (ApiClient, Arc<RecordingSleeper>) {
    let cfg = Config {
        api_base_url: base_url,
        api_token: "test-token".to_string(),
        db_path: PathBuf::from("unused.sqlite"),
        league_names: Vec::new(),
        euro_league_ids: Vec::new(),
        domestic_cup_league_ids: Vec::new(),
        season_year_min: 2017,
        season_year_max: 2025,
        max_retries,
    };
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = ApiClient::new(&cfg).with_sleeper(sleeper.clone());
    (client, sleeper)
}

#[test]
fn rate_limit_honors_retry_after_then_succeeds() {
    let (base_url, server) = serve_scripted(vec![
        response("429 Too Many Requests", "Retry-After: 7\r\n", ""),
        response("200 OK", "", r#"{"data": [{"id": 1}]}"#),
    ]);
    let (client, sleeper) = client_for(base_url, 6);

    let obj = client.get("fixtures", &[]).expect("request should recover");
    assert_eq!(obj["data"][0]["id"], 1);

    let sleeps = sleeper.secs();
    assert_eq!(sleeps.len(), 1);
    assert!(
        (7.0..7.5).contains(&sleeps[0]),
        "retry-after plus jitter, got {sleeps:?}"
    );

    let seen = server.join().unwrap();
    // Token goes out as-is, no Bearer prefix.
    assert!(seen[0].to_lowercase().contains("authorization: test-token"));
}

#[test]
fn rate_limit_exhaustion_propagates_the_original_error() {
    let too_many = response("429 Too Many Requests", "", "");
    let (base_url, server) =
        serve_scripted(vec![too_many.clone(), too_many.clone(), too_many]);
    let (client, sleeper) = client_for(base_url, 3);

    let err = client.get("fixtures", &[]).unwrap_err();
    assert!(err.to_string().contains("429"), "{err}");

    // Without a Retry-After header the backoff runs 1, 2, ... and the final
    // failed attempt does not sleep again.
    let sleeps = sleeper.secs();
    assert_eq!(sleeps.len(), 2);
    assert!((1.0..1.5).contains(&sleeps[0]), "{sleeps:?}");
    assert!((2.0..2.5).contains(&sleeps[1]), "{sleeps:?}");
    server.join().unwrap();
}

#[test]
fn server_errors_back_off_until_the_ceiling() {
    let boom = response("500 Internal Server Error", "", "");
    let (base_url, server) = serve_scripted(vec![boom.clone(), boom.clone(), boom]);
    let (client, sleeper) = client_for(base_url, 3);

    let err = client.get("fixtures", &[]).unwrap_err();
    assert!(err.to_string().contains("500"), "{err}");

    let sleeps = sleeper.secs();
    assert_eq!(sleeps.len(), 2);
    assert!((1.0..1.25).contains(&sleeps[0]), "{sleeps:?}");
    assert!((2.0..2.25).contains(&sleeps[1]), "{sleeps:?}");
    server.join().unwrap();
}

#[test]
fn other_client_errors_propagate_without_retrying() {
    let (base_url, server) = serve_scripted(vec![response("404 Not Found", "", "missing")]);
    let (client, sleeper) = client_for(base_url, 6);

    let err = client.get("leagues/999", &[]).unwrap_err();
    assert!(err.to_string().contains("404"), "{err}");
    assert!(sleeper.secs().is_empty());
    server.join().unwrap();
}

#[test]
fn pagination_walks_until_has_more_goes_false() {
    let (base_url, server) = serve_scripted(vec![
        response(
            "200 OK",
            "",
            r#"{"data": [{"id": 1}, {"id": 2}], "pagination": {"has_more": true}}"#,
        ),
        response(
            "200 OK",
            "",
            r#"{"data": [{"id": 3}], "pagination": {"has_more": false}}"#,
        ),
    ]);
    let (client, _) = client_for(base_url, 6);

    let ids: Vec<i64> = client
        .get_paginated("fixtures", &[])
        .map(|item| item.unwrap()["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let seen = server.join().unwrap();
    assert!(seen[0].contains("page=1"));
    assert!(seen[1].contains("page=2"));
}
