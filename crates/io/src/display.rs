// Console readout for live sessions.

use std::{collections::BTreeMap, io::Write, sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

use forza_ingest_core::{DisplaySink, FinalSummary, Snapshot};

pub fn snapshot_line(label: &str, s: &Snapshot) -> String {
    format!(
        "[{label}] {:.1} mph | gear {} | {:.0}/{:.0} rpm ({:.1}%)",
        s.speed_mph, s.gear, s.current_rpm, s.max_rpm, s.percent_max_rpm
    )
}

pub fn summary_line(label: &str, f: &FinalSummary) -> String {
    match f.last_speed_mph {
        Some(mph) => format!("[{label}] race finished, last speed {mph:.1} mph after {} ticks", f.ticks),
        None => format!("[{label}] race finished before any tick was recorded"),
    }
}

/// Single-session display that rewrites one terminal line per tick.
pub struct ConsoleDisplay<W> {
    label: String,
    out: W,
    last_len: usize,
}

impl<W: Write + Send> ConsoleDisplay<W> {
    pub fn new(label: impl Into<String>, out: W) -> Self {
        Self { label: label.into(), out, last_len: 0 }
    }

    pub fn into_inner(self) -> W { self.out }
}

impl ConsoleDisplay<std::io::Stdout> {
    pub fn stdout(label: impl Into<String>) -> Self {
        Self::new(label, std::io::stdout())
    }
}

impl<W: Write + Send> DisplaySink for ConsoleDisplay<W> {
    fn show(&mut self, snapshot: &Snapshot) {
        let line = snapshot_line(&self.label, snapshot);
        let width = self.last_len;
        self.last_len = line.len();
        if let Err(err) = write!(self.out, "\r{line:<width$}").and_then(|_| self.out.flush()) {
            warn!(%err, label = %self.label, "display write failed");
        }
    }

    fn finish(&mut self, summary: &FinalSummary) {
        let line = summary_line(&self.label, summary);
        let res = if self.last_len > 0 {
            writeln!(self.out).and_then(|_| writeln!(self.out, "{line}"))
        } else {
            writeln!(self.out, "{line}")
        };
        if let Err(err) = res.and_then(|_| self.out.flush()) {
            warn!(%err, label = %self.label, "display write failed");
        }
        self.last_len = 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Tick { label: Arc<str>, snapshot: Snapshot },
    Finished { label: Arc<str>, summary: FinalSummary },
}

pub type DisplayTx = Sender<DisplayEvent>;
pub type DisplayRx = Receiver<DisplayEvent>;

pub fn display_channel() -> (DisplayTx, DisplayRx) {
    crossbeam_channel::unbounded()
}

/// Forwards one session's readout to a shared renderer thread.
#[derive(Clone)]
pub struct ChannelDisplay {
    label: Arc<str>,
    tx: DisplayTx,
}

impl ChannelDisplay {
    pub fn new(label: impl Into<Arc<str>>, tx: DisplayTx) -> Self {
        Self { label: label.into(), tx }
    }
}

impl DisplaySink for ChannelDisplay {
    fn show(&mut self, snapshot: &Snapshot) {
        // renderer gone means nobody is watching; keep recording
        let _ = self.tx.send(DisplayEvent::Tick { label: self.label.clone(), snapshot: *snapshot });
    }

    fn finish(&mut self, summary: &FinalSummary) {
        let _ = self.tx.send(DisplayEvent::Finished { label: self.label.clone(), summary: *summary });
    }
}

/// Keeps the latest line of every live session and redraws them as one
/// status line; finished sessions get their own permanent line.
pub struct ConsoleBoard<W> {
    out: W,
    live: BTreeMap<Arc<str>, String>,
    last_len: usize,
}

impl<W: Write> ConsoleBoard<W> {
    pub fn new(out: W) -> Self {
        Self { out, live: BTreeMap::new(), last_len: 0 }
    }

    pub fn apply(&mut self, event: DisplayEvent) -> std::io::Result<()> {
        match event {
            DisplayEvent::Tick { label, snapshot } => {
                let line = snapshot_line(&label, &snapshot);
                self.live.insert(label, line);
                self.redraw()
            }
            DisplayEvent::Finished { label, summary } => {
                self.live.remove(&label);
                self.clear()?;
                writeln!(self.out, "{}", summary_line(&label, &summary))?;
                if self.live.is_empty() {
                    self.out.flush()
                } else {
                    self.redraw()
                }
            }
        }
    }

    pub fn into_inner(self) -> W { self.out }

    fn status(&self) -> String {
        self.live.values().cloned().collect::<Vec<_>>().join("  ||  ")
    }

    fn redraw(&mut self) -> std::io::Result<()> {
        let line = self.status();
        let width = self.last_len;
        self.last_len = line.len();
        write!(self.out, "\r{line:<width$}")?;
        self.out.flush()
    }

    fn clear(&mut self) -> std::io::Result<()> {
        if self.last_len > 0 {
            write!(self.out, "\r{:width$}\r", "", width = self.last_len)?;
            self.last_len = 0;
        }
        Ok(())
    }
}

/// Runs a [`ConsoleBoard`] on its own thread until every sender is dropped,
/// then hands back the writer.
pub fn spawn_console_renderer<W>(rx: DisplayRx, out: W) -> thread::JoinHandle<W>
where
    W: Write + Send + 'static,
{
    thread::spawn(move || {
        let mut board = ConsoleBoard::new(out);
        for event in rx.iter() {
            if let Err(err) = board.apply(event) {
                warn!(%err, "console renderer write failed");
            }
        }
        board.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(mph: f64, pct: f64) -> Snapshot {
        Snapshot { speed_mph: mph, gear: 3, current_rpm: 4000.0, max_rpm: 8000.0, percent_max_rpm: pct }
    }

    #[test]
    fn test_snapshot_line_format() {
        assert_eq!(
            snapshot_line("Car-5030", &snap(22.3694, 50.0)),
            "[Car-5030] 22.4 mph | gear 3 | 4000/8000 rpm (50.0%)"
        );
    }

    #[test]
    fn test_snapshot_line_shows_nan_sentinel() {
        assert!(snapshot_line("a", &snap(1.0, f64::NAN)).ends_with("(NaN%)"));
    }

    #[test]
    fn test_console_display_overwrites_then_summarises() {
        let mut d = ConsoleDisplay::new("car", Vec::new());
        d.show(&snap(10.0, 10.0));
        d.show(&snap(12.0, 10.0));
        d.finish(&FinalSummary { last_speed_mph: Some(12.0), ticks: 2 });
        let text = String::from_utf8(d.into_inner()).unwrap();
        assert_eq!(text.matches('\r').count(), 2);
        assert!(text.ends_with("[car] race finished, last speed 12.0 mph after 2 ticks\n"));
    }

    #[test]
    fn test_renderer_keeps_sessions_apart() {
        let (tx, rx) = display_channel();
        let handle = spawn_console_renderer(rx, Vec::new());
        let mut a = ChannelDisplay::new("A", tx.clone());
        let mut b = ChannelDisplay::new("B", tx);
        a.show(&snap(1.0, 1.0));
        b.show(&snap(2.0, 2.0));
        a.finish(&FinalSummary { last_speed_mph: Some(1.0), ticks: 1 });
        b.finish(&FinalSummary { last_speed_mph: Some(2.0), ticks: 1 });
        drop(a);
        drop(b);

        let text = String::from_utf8(handle.join().unwrap()).unwrap();
        let finished: Vec<&str> = text
            .lines()
            .filter_map(|l| l.rsplit('\r').next())
            .filter(|l| l.contains("race finished"))
            .collect();
        assert_eq!(finished.len(), 2);
        assert!(finished[0].starts_with("[A]"));
        assert!(finished[1].starts_with("[B]"));
    }
}
