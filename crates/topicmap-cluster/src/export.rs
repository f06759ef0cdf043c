use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

use topicmap_core::error::Result;
use topicmap_core::traits::MetadataProvider;

use crate::engine::ClusterRun;
use crate::label::{resolve, truncate_chars, UNKNOWN};

pub const CLUSTER_MAP: &str = "cluster_map.json";
pub const CLUSTER_LABELS: &str = "cluster_labels.json";
pub const ASSIGNMENTS_CSV: &str = "cluster_assignments.csv";
pub const SUMMARY_CSV: &str = "cluster_summary.csv";
pub const PLOT_PNG: &str = "cluster_plot.png";
pub const PLOT_LEGEND_CSV: &str = "cluster_plot_legend.csv";

const SUMMARY_CHARS: usize = 180;
const PLOT_SIZE: u32 = 900;
const PLOT_MARGIN: f32 = 40.0;

const PALETTE: [[u8; 3]; 20] = [
    [31, 119, 180], [255, 127, 14], [44, 160, 44], [214, 39, 40], [148, 103, 189],
    [140, 86, 75], [227, 119, 194], [127, 127, 127], [188, 189, 34], [23, 190, 207],
    [174, 199, 232], [255, 187, 120], [152, 223, 138], [255, 152, 150], [197, 176, 213],
    [196, 156, 148], [247, 182, 210], [199, 199, 199], [219, 219, 141], [158, 218, 229],
];

#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub cluster_map: PathBuf,
    pub cluster_labels: PathBuf,
    pub assignments: PathBuf,
    pub plot: PathBuf,
    pub plot_legend: PathBuf,
    pub summary: Option<PathBuf>,
}

#[derive(Serialize)]
struct AssignmentRow<'a> {
    member_id: &'a str,
    x: f32,
    y: f32,
    cluster_id: i32,
    label: &'a str,
}

#[derive(Serialize)]
struct LegendRow<'a> {
    label: &'a str,
    cluster_ids: String,
    color: String,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    member_id: &'a str,
    category: String,
    summary: String,
    topics: String,
    tags: String,
    themes: String,
    cluster_id: i32,
    label: &'a str,
}

/// Writes every artifact into `out_dir`; the summary CSV only when metadata is supplied.
pub fn export(out_dir: &Path, run: &ClusterRun, metadata: Option<&dyn MetadataProvider>) -> Result<ExportPaths> {
    std::fs::create_dir_all(out_dir)?;
    let paths = ExportPaths {
        cluster_map: out_dir.join(CLUSTER_MAP),
        cluster_labels: out_dir.join(CLUSTER_LABELS),
        assignments: out_dir.join(ASSIGNMENTS_CSV),
        plot: out_dir.join(PLOT_PNG),
        plot_legend: out_dir.join(PLOT_LEGEND_CSV),
        summary: metadata.map(|_| out_dir.join(SUMMARY_CSV)),
    };

    std::fs::write(&paths.cluster_map, serde_json::to_string_pretty(&run.members())?)?;
    std::fs::write(&paths.cluster_labels, serde_json::to_string_pretty(&run.labels)?)?;

    let mut wtr = csv::Writer::from_path(&paths.assignments)?;
    for (i, id) in run.ids.iter().enumerate() {
        let cid = run.assignment[i];
        wtr.serialize(AssignmentRow { member_id: id, x: run.coords[i][0], y: run.coords[i][1], cluster_id: cid, label: resolve(&run.labels, cid) })?;
    }
    wtr.flush()?;

    if let (Some(meta), Some(path)) = (metadata, &paths.summary) {
        write_summary(path, run, meta)?;
    }

    let colors = label_colors(run);
    render_plot(&paths.plot, run, &colors)?;
    write_legend(&paths.plot_legend, run, &colors)?;
    info!(dir = %out_dir.display(), members = run.ids.len(), clusters = run.labels.len(), "exported cluster artifacts");
    Ok(paths)
}

fn write_summary(path: &Path, run: &ClusterRun, meta: &dyn MetadataProvider) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for (id, &cid) in run.ids.iter().zip(&run.assignment) {
        let m = meta.get(id);
        let row = SummaryRow {
            member_id: id,
            category: m.as_ref().and_then(|m| m.category.clone()).unwrap_or_else(|| UNKNOWN.to_string()),
            summary: m.as_ref().and_then(|m| m.summary.as_deref()).map(|s| truncate_chars(s, SUMMARY_CHARS)).unwrap_or_default(),
            topics: m.as_ref().map(|m| m.topics.join("; ")).unwrap_or_default(),
            tags: m.as_ref().map(|m| m.tags.join("; ")).unwrap_or_default(),
            themes: m.as_ref().map(|m| m.themes.join("; ")).unwrap_or_default(),
            cluster_id: cid,
            label: resolve(&run.labels, cid),
        };
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Palette colour per resolved label, labels in lexicographic order.
fn label_colors(run: &ClusterRun) -> BTreeMap<&str, Rgb<u8>> {
    let labels: BTreeSet<&str> = run.assignment.iter().map(|&c| resolve(&run.labels, c)).collect();
    labels.into_iter().enumerate().map(|(i, l)| (l, Rgb(PALETTE[i % PALETTE.len()]))).collect()
}

fn render_plot(path: &Path, run: &ClusterRun, colors: &BTreeMap<&str, Rgb<u8>>) -> Result<()> {
    let mut img = RgbImage::from_pixel(PLOT_SIZE, PLOT_SIZE, Rgb([255, 255, 255]));
    draw_hollow_rect_mut(&mut img, Rect::at(0, 0).of_size(PLOT_SIZE, PLOT_SIZE), Rgb([200, 200, 200]));

    let (min, max) = bounds(&run.coords);
    let span = [(max[0] - min[0]).max(1e-6), (max[1] - min[1]).max(1e-6)];
    let usable = PLOT_SIZE as f32 - 2.0 * PLOT_MARGIN;
    for (p, &cid) in run.coords.iter().zip(&run.assignment) {
        let x = PLOT_MARGIN + (p[0] - min[0]) / span[0] * usable;
        let y = PLOT_SIZE as f32 - PLOT_MARGIN - (p[1] - min[1]) / span[1] * usable;
        let color = colors.get(resolve(&run.labels, cid)).copied().unwrap_or(Rgb([0, 0, 0]));
        draw_filled_circle_mut(&mut img, (x.round() as i32, y.round() as i32), 4, color);
    }
    img.save(path)?;
    Ok(())
}

/// The plot's key: one row per label with its cluster ids and `#rrggbb` colour.
fn write_legend(path: &Path, run: &ClusterRun, colors: &BTreeMap<&str, Rgb<u8>>) -> Result<()> {
    let mut ids: BTreeMap<&str, BTreeSet<i32>> = BTreeMap::new();
    for &cid in &run.assignment {
        ids.entry(resolve(&run.labels, cid)).or_default().insert(cid);
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for (&label, &Rgb([r, g, b])) in colors {
        let cluster_ids = ids.get(label).map(|s| s.iter().map(i32::to_string).collect::<Vec<_>>().join(";")).unwrap_or_default();
        wtr.serialize(LegendRow { label, cluster_ids, color: format!("#{r:02x}{g:02x}{b:02x}") })?;
    }
    wtr.flush()?;
    Ok(())
}

fn bounds(coords: &[[f32; 2]]) -> ([f32; 2], [f32; 2]) {
    if coords.is_empty() { return ([0.0, 0.0], [1.0, 1.0]); }
    coords.iter().fold(([f32::MAX, f32::MAX], [f32::MIN, f32::MIN]), |(lo, hi), p| {
        ([lo[0].min(p[0]), lo[1].min(p[1])], [hi[0].max(p[0]), hi[1].max(p[1])])
    })
}
