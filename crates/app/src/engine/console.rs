//! Per-tick stdout output for humans and line-oriented consumers.

use std::{
    fmt::Write as _,
    io::{self, Write},
};

use clap::ValueEnum;

use crate::engine::data::FrameSnapshot;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Labeled multi-line block per frame.
    #[default]
    Default,
    /// `timestamp,label,x,y,z,px,py,confidence` per object.
    Simple,
    /// `label,x,y,z,timestamp` per object.
    Legacy,
}

pub(crate) struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub(crate) fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Text for one snapshot; empty when there is nothing to report.
    pub(crate) fn render(&self, snapshot: &FrameSnapshot) -> String {
        let mut out = String::new();
        match self.format {
            OutputFormat::Default => {
                let _ = writeln!(
                    out,
                    "frame {} @ {}us  {}x{}  {:.1} fps  camera {}",
                    snapshot.frame_number,
                    snapshot.timestamp_us,
                    snapshot.width,
                    snapshot.height,
                    snapshot.status.fps,
                    if snapshot.status.camera_connected { "ok" } else { "lost" },
                );
                for o in &snapshot.observations {
                    let _ = writeln!(
                        out,
                        "  {} [{}] pixel=({}, {}) world=({}, {}, {}) m depth={} m radius={} px confidence={}",
                        o.id,
                        o.label,
                        o.pixel.x,
                        o.pixel.y,
                        o.world.x,
                        o.world.y,
                        o.world.z,
                        o.depth_m,
                        o.radius_px,
                        o.confidence,
                    );
                }
            }
            OutputFormat::Simple => {
                for o in &snapshot.observations {
                    let _ = writeln!(
                        out,
                        "{},{},{},{},{},{},{},{}",
                        o.timestamp_us,
                        o.label,
                        o.world.x,
                        o.world.y,
                        o.world.z,
                        o.pixel.x,
                        o.pixel.y,
                        o.confidence,
                    );
                }
            }
            OutputFormat::Legacy => {
                for o in &snapshot.observations {
                    let _ = writeln!(
                        out,
                        "{},{},{},{},{}",
                        o.label, o.world.x, o.world.y, o.world.z, o.timestamp_us,
                    );
                }
            }
        }
        out
    }

    pub(crate) fn write(&self, snapshot: &FrameSnapshot) -> io::Result<()> {
        let text = self.render(snapshot);
        if text.is_empty() {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::data::fixtures::{observation, snapshot};

    fn frame() -> FrameSnapshot {
        snapshot(vec![observation("green", [0.1, 0.2, 0.3])])
    }

    #[test]
    fn simple_line() {
        let text = ConsoleWriter::new(OutputFormat::Simple).render(&frame());
        assert_eq!(text, "1000,green,0.1,0.2,0.3,50,60,1\n");
    }

    #[test]
    fn legacy_line() {
        let text = ConsoleWriter::new(OutputFormat::Legacy).render(&frame());
        assert_eq!(text, "green,0.1,0.2,0.3,1000\n");
    }

    #[test]
    fn default_block_labels_fields() {
        let text = ConsoleWriter::new(OutputFormat::Default).render(&frame());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("frame 1 @ 1000us  640x480"));
        assert!(lines[1].contains("green_0 [green] pixel=(50, 60) world=(0.1, 0.2, 0.3)"));
    }

    #[test]
    fn line_formats_are_silent_without_objects() {
        let empty = snapshot(Vec::new());
        assert!(ConsoleWriter::new(OutputFormat::Simple).render(&empty).is_empty());
        assert!(!ConsoleWriter::new(OutputFormat::Default).render(&empty).is_empty());
    }
}
