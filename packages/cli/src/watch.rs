//! `crashlens watch`: a live viewport session driven from stdin.

use std::sync::Arc;

use crashlens_incident_models::Criticality;
use crashlens_pipeline::{FilterCriteria, LengthBucket, SortKey};
use crashlens_sync::{CacheEntry, Listener, QueryKey, QueryScheduler, ViewportSession};
use crashlens_viewport::{BoundingBox, Canonicalizer, Viewport, parse_bbox};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::sync::mpsc;

use crate::render;

pub const HELP: &str = "\
Commands:
  bbox <west,south,east,north>   move the viewport
  pan <dlat> <dlon>              shift the viewport by degrees
  crit <level|all>               change the criticality filter
  search [text]                  change the search text
  length <all|short|medium|long> change the length bucket
  sort <severity|time|length>    change the sort key
  refresh                        refetch the active viewport now
  help                           show this message";

/// A line typed into the watch prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchCommand {
    Bbox(BoundingBox),
    Pan { d_lat: f64, d_lon: f64 },
    Criticality(Option<Criticality>),
    Search(String),
    Length(LengthBucket),
    Sort(SortKey),
    Refresh,
    Help,
}

impl WatchCommand {
    /// Parses one input line.
    ///
    /// # Errors
    ///
    /// Returns a message describing why the line was rejected.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match word.to_lowercase().as_str() {
            "bbox" => parse_bbox(rest).map(Self::Bbox).map_err(|e| e.to_string()),
            "pan" => {
                let mut parts = rest.split_whitespace().map(str::parse::<f64>);
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(Ok(d_lat)), Some(Ok(d_lon)), None) => Ok(Self::Pan { d_lat, d_lon }),
                    _ => Err(format!("expected 'pan <dlat> <dlon>', got {rest:?}")),
                }
            }
            "crit" | "criticality" => {
                if rest.eq_ignore_ascii_case("all") {
                    return Ok(Self::Criticality(None));
                }
                rest.parse::<Criticality>()
                    .ok()
                    .filter(|c| *c != Criticality::Unknown)
                    .map(|c| Self::Criticality(Some(c)))
                    .ok_or_else(|| format!("unknown criticality {rest:?}"))
            }
            "search" => Ok(Self::Search(rest.to_string())),
            "length" => rest
                .parse()
                .map(Self::Length)
                .map_err(|_| format!("unknown length bucket {rest:?}")),
            "sort" => rest
                .parse()
                .map(Self::Sort)
                .map_err(|_| format!("unknown sort key {rest:?}")),
            "refresh" => Ok(Self::Refresh),
            "help" | "?" => Ok(Self::Help),
            _ => Err(format!("unknown command {word:?}, type 'help'")),
        }
    }
}

/// Presentation state owned by the watch loop.
struct View {
    criteria: FilterCriteria,
    sort: SortKey,
}

impl View {
    fn print(&self, session: &ViewportSession) {
        let entry = session.current();
        let bbox = session.bbox();
        let incidents = session.view(&self.criteria, self.sort);

        println!();
        println!(
            "== {}  sort={} length={}",
            bbox.key(),
            self.sort,
            self.criteria.length.label()
        );
        println!("{}", render::freshness_line(&entry));
        println!("{}", render::stats_line(&session.stats()));
        print!("{}", render::incident_table(&incidents));
        if !incidents.is_empty() {
            println!("{} shown", incidents.len());
        }
    }
}

/// Runs the session until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the Ctrl-C handler cannot be installed.
pub async fn run(
    scheduler: QueryScheduler,
    canonicalizer: Canonicalizer,
    criteria: FilterCriteria,
    sort: SortKey,
) -> std::io::Result<()> {
    let (tx, mut updates) = mpsc::unbounded_channel::<QueryKey>();
    let listener: Listener = Arc::new(move |key: &QueryKey, _: &CacheEntry| {
        let _ = tx.send(key.clone());
    });

    let mut session = ViewportSession::new(scheduler, canonicalizer, listener);
    session.set_criticality(criteria.criticality);
    let mut view = View { criteria, sort };

    println!("Watching {}. Type 'help' for commands, Ctrl-C to quit.", session.bbox().key());
    view.print(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                log::info!("Stopping watch");
                break;
            }
            Some(key) = updates.recv() => {
                log::debug!("Update for {key}");
                view.print(&session);
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match WatchCommand::parse(&line) {
                    Ok(command) => apply(command, &mut session, &mut view).await,
                    Err(message) => eprintln!("{message}"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("Stopped reading commands: {e}");
                    stdin_open = false;
                }
            },
        }
    }

    Ok(())
}

async fn apply(command: WatchCommand, session: &mut ViewportSession, view: &mut View) {
    match command {
        WatchCommand::Bbox(bbox) => {
            session.on_viewport_change(Viewport::from(bbox));
        }
        WatchCommand::Pan { d_lat, d_lon } => {
            let panned = Viewport::from(session.bbox()).panned(d_lat, d_lon);
            if !session.on_viewport_change(panned) {
                log::debug!("Pan kept the same query");
            }
        }
        WatchCommand::Criticality(criticality) => {
            view.criteria.criticality = criticality;
            session.set_criticality(criticality);
        }
        WatchCommand::Search(text) => view.criteria.search = text,
        WatchCommand::Length(bucket) => view.criteria.length = bucket,
        WatchCommand::Sort(key) => view.sort = key,
        WatchCommand::Refresh => {
            session.refresh().await;
        }
        WatchCommand::Help => {
            println!("{HELP}");
            return;
        }
    }
    view.print(session);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_viewport_commands() {
        assert_eq!(
            WatchCommand::parse("bbox -86.9,36.0,-86.6,36.3"),
            Ok(WatchCommand::Bbox(
                BoundingBox::try_new(-86.9, 36.0, -86.6, 36.3).unwrap()
            ))
        );
        assert_eq!(
            WatchCommand::parse("  pan 0.1 -0.05 "),
            Ok(WatchCommand::Pan {
                d_lat: 0.1,
                d_lon: -0.05
            })
        );
        assert!(WatchCommand::parse("pan 0.1").is_err());
        assert!(WatchCommand::parse("bbox 1,2,3").is_err());
    }

    #[test]
    fn parses_filter_commands() {
        assert_eq!(
            WatchCommand::parse("crit Major"),
            Ok(WatchCommand::Criticality(Some(Criticality::Major)))
        );
        assert_eq!(
            WatchCommand::parse("crit all"),
            Ok(WatchCommand::Criticality(None))
        );
        assert!(WatchCommand::parse("crit severe").is_err());
        assert_eq!(
            WatchCommand::parse("search Bridge St"),
            Ok(WatchCommand::Search("Bridge St".to_string()))
        );
        assert_eq!(
            WatchCommand::parse("search"),
            Ok(WatchCommand::Search(String::new()))
        );
        assert_eq!(
            WatchCommand::parse("length long"),
            Ok(WatchCommand::Length(LengthBucket::Long))
        );
        assert_eq!(
            WatchCommand::parse("sort time"),
            Ok(WatchCommand::Sort(SortKey::Time))
        );
        assert!(WatchCommand::parse("sort distance").is_err());
    }

    #[test]
    fn rejects_unknown_commands() {
        assert_eq!(WatchCommand::parse("REFRESH"), Ok(WatchCommand::Refresh));
        assert_eq!(WatchCommand::parse("?"), Ok(WatchCommand::Help));
        let err = WatchCommand::parse("zoom 3").unwrap_err();
        assert!(err.contains("zoom"), "{err}");
    }
}
