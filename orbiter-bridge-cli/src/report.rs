//! Run reports
//!
//! Summarises a finished session as plain text or JSON: counters, final clock,
//! per-event dispatch counts, catalog contents and the tracer's log.

use anyhow::{Context, Result};
use chrono::Utc;
use orbiter_bridge::{HostApi, Object, ObjectTrait, SimClock, Vector3};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::config::OutputFormat;
use crate::scenario::{RunSummary, ScenarioRunner};
use crate::trace::TraceEntry;

#[derive(Debug, Clone, Serialize)]
pub struct LibraryInfo {
    pub path: String,
    pub build_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectInfo {
    pub name: String,
    pub kind: String,
    pub mass: f64,
    pub position: Vector3,
}

/// Everything worth keeping from one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: String,
    pub bridge_version: &'static str,
    pub abi_tag: &'static str,
    pub orbiter_version: u32,
    pub summary: RunSummary,
    pub final_clock: SimClock,
    pub time_acceleration: f64,
    pub paused: bool,
    pub libraries: Vec<LibraryInfo>,
    /// Dispatch count per callback slot, destroys counted per module
    pub dispatch: BTreeMap<&'static str, u64>,
    pub debug_line: String,
    pub objects: Vec<ObjectInfo>,
    pub trace: Vec<TraceEntry>,
}

impl RunReport {
    pub fn from_runner(runner: &ScenarioRunner) -> Self {
        let host = runner.host();
        let api: &dyn HostApi = runner.catalog();

        let objects = Object::all(api)
            .iter()
            .map(|object| ObjectInfo {
                name: object.name(api),
                kind: format!("{:?}", object.kind()),
                mass: object.mass(api),
                position: object.global_pos(api),
            })
            .collect();

        Self {
            generated_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            bridge_version: orbiter_bridge::VERSION,
            abi_tag: orbiter_bridge::abi_tag(),
            orbiter_version: api.orbiter_version(),
            summary: runner.summary().clone(),
            final_clock: host.clock(),
            time_acceleration: runner.time_acceleration(),
            paused: runner.is_paused(),
            libraries: runner
                .libraries()
                .iter()
                .map(|lib| LibraryInfo {
                    path: lib.path().display().to_string(),
                    build_date: lib.build_date().to_string(),
                })
                .collect(),
            dispatch: host
                .stats()
                .iter()
                .map(|(slot, count)| (slot.name(), count))
                .collect(),
            debug_line: runner.catalog().debug_line(),
            objects,
            trace: runner
                .trace()
                .map(|log| log.borrow().clone())
                .unwrap_or_default(),
        }
    }

    pub fn total_dispatches(&self) -> u64 {
        self.dispatch.values().sum()
    }
}

const RULE: &str = "═══════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────";

/// Plain-text rendering
pub fn render_txt(report: &RunReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_txt(&mut out, report);
    out
}

fn write_txt(out: &mut String, report: &RunReport) -> std::fmt::Result {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "  Orbiter Bridge - Session Report")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "Generated:       {}", report.generated_at)?;
    writeln!(out, "Bridge:          {}", report.abi_tag)?;
    writeln!(out, "Orbiter version: {}", report.orbiter_version)?;
    for lib in &report.libraries {
        writeln!(out, "Module library:  {} (built {})", lib.path, lib.build_date)?;
    }

    writeln!(out, "\nSession")?;
    writeln!(out, "{}", THIN_RULE)?;
    let summary = &report.summary;
    writeln!(
        out,
        "  Frames:          {} ({} simulated)",
        summary.frames, summary.steps_simulated
    )?;
    writeln!(
        out,
        "  Events:          {} applied, {} skipped",
        summary.events_applied, summary.events_skipped
    )?;
    writeln!(out, "  Inputs consumed: {}", summary.inputs_consumed)?;
    writeln!(
        out,
        "  Final clock:     t={:.3} s, dt={:.3} s, MJD {:.6}",
        report.final_clock.simt, report.final_clock.simdt, report.final_clock.mjd
    )?;
    writeln!(
        out,
        "  Time warp:       x{}{}",
        report.time_acceleration,
        if report.paused { " (paused)" } else { "" }
    )?;
    if !report.debug_line.is_empty() {
        writeln!(out, "  Debug line:      {}", report.debug_line)?;
    }

    writeln!(out, "\nDispatch ({} total)", report.total_dispatches())?;
    writeln!(out, "{}", THIN_RULE)?;
    for (slot, count) in &report.dispatch {
        writeln!(out, "  {:<28} {:>8}", slot, count)?;
    }

    if !report.objects.is_empty() {
        writeln!(out, "\nObjects")?;
        writeln!(out, "{}", THIN_RULE)?;
        for object in &report.objects {
            writeln!(
                out,
                "  {:<16} {:<12} {:>14.1} kg  {}",
                object.name, object.kind, object.mass, object.position
            )?;
        }
    }

    if !report.trace.is_empty() {
        writeln!(out, "\nTrace")?;
        writeln!(out, "{}", THIN_RULE)?;
        for entry in &report.trace {
            writeln!(out, "  [{:>10.3}] {:<28} {}", entry.simt, entry.event, entry.detail)?;
        }
    }

    Ok(())
}

/// Write the report to `path`, or stdout if `None`
pub fn write_report(report: &RunReport, format: OutputFormat, path: Option<&Path>) -> Result<()> {
    let content = match format {
        OutputFormat::Txt => render_txt(report),
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialise report")? + "\n"
        }
    };

    match path {
        Some(path) => {
            fs::write(path, content)
                .with_context(|| format!("Failed to write report: {:?}", path))?;
            log::info!("Report written to {:?}", path);
        }
        None => print!("{}", content),
    }
    Ok(())
}
