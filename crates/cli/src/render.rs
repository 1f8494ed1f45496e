//! Terminal rendering of controller state. Presentation only.

use querydeck_core::types::{RequestState, SearchResult, Snapshot, TimingMetrics};

const PREVIEW_CHARS: usize = 96;

/// Print a request state: results on stdout, status lines on stderr.
pub fn print_state(state: &RequestState, json: bool) {
    if json {
        match serde_json::to_string_pretty(state) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Could not serialize state: {e}"),
        }
        return;
    }

    match state {
        RequestState::Idle => eprintln!("(idle)"),
        RequestState::Loading => eprintln!("Searching..."),
        RequestState::Error { message } => eprintln!("{message}"),
        RequestState::Success { results, timing } => {
            if results.is_empty() {
                eprintln!("No results");
            }
            for (i, r) in results.iter().enumerate() {
                println!("{}", format_result(i + 1, r));
            }
            eprintln!("\n{}", metadata_line(results.len(), timing));
        }
    }
}

pub fn print_snapshot(snapshot: &Snapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Could not serialize snapshot: {e}"),
        }
        return;
    }
    print_state(&snapshot.request, false);
}

/// Result count plus timings, e.g. `3 results · 41.2ms (embeddings 30.0ms, search 8.1ms)`.
pub fn metadata_line(count: usize, timing: &TimingMetrics) -> String {
    let noun = if count == 1 { "result" } else { "results" };
    format!(
        "{count} {noun} \u{00B7} {:.1}ms (embeddings {:.1}ms, search {:.1}ms)",
        timing.total, timing.embeddings, timing.search
    )
}

pub fn format_result(rank: usize, r: &SearchResult) -> String {
    let score = r.score.map(|s| format!("{s:>5.2}")).unwrap_or_else(|| "    -".to_string());
    let mut head = format!("{rank:>3}. {score}  {}", r.name.as_deref().unwrap_or("(untitled)"));
    if let Some(location) = &r.location {
        head.push_str(&format!("  [{location}]"));
    }

    let mut out = head;
    if let Some(summary) = &r.summary {
        out.push_str(&format!("\n          {}", preview(summary)));
    }
    if let Some(text) = &r.text {
        out.push_str(&format!("\n          {}", preview(text)));
    }
    out
}

/// First line of `s`, cut to a fixed width on a char boundary.
fn preview(s: &str) -> String {
    let line = s.lines().next().unwrap_or("").trim();
    if line.chars().count() <= PREVIEW_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}
