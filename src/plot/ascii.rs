//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of a sweep at the bench
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - measured samples: `o`
//! - fitted model curve: `-` line

use crate::domain::{CalibrationRun, ModelKind, WaveplateParams};
use crate::models::predict;

/// Render measured power against angle, optionally overlaying a fitted model.
pub fn render_ascii_plot(
    run: &CalibrationRun,
    fit: Option<(ModelKind, &WaveplateParams)>,
    width: usize,
    height: usize,
) -> String {
    let points: Vec<(f64, f64)> = run
        .samples
        .iter()
        .map(|s| (f64::from(s.angle), s.power))
        .collect();
    let (a_min, a_max) = angle_range(&points).unwrap_or((0.0, 359.0));
    let curve = fit.map(|(model, params)| sample_curve(model, params, a_min, a_max, width.max(2)));
    render_plot(&points, curve.as_deref(), a_min, a_max, width, height)
}

fn render_plot(
    points: &[(f64, f64)],
    curve_points: Option<&[(f64, f64)]>,
    a_min: f64,
    a_max: f64,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (p_min, p_max) = power_range(points, curve_points).unwrap_or((0.0, 1.0));
    let (p_min, p_max) = pad_range(p_min, p_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so samples overlay it.
    if let Some(curve) = curve_points {
        draw_curve(&mut grid, curve, a_min, a_max, p_min, p_max);
    }

    for &(angle, power) in points {
        let x = map_x(angle, a_min, a_max, width);
        let y = map_y(power, p_min, p_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: angle=[{a_min:.0}, {a_max:.0}] deg | power=[{p_min:.3e}, {p_max:.3e}]\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn angle_range(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_a = f64::INFINITY;
    let mut max_a = f64::NEG_INFINITY;
    for &(a, _) in points {
        min_a = min_a.min(a);
        max_a = max_a.max(a);
    }
    if min_a.is_finite() && max_a.is_finite() && max_a > min_a {
        Some((min_a, max_a))
    } else {
        None
    }
}

fn sample_curve(model: ModelKind, params: &WaveplateParams, a_min: f64, a_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            let a = a_min + u * (a_max - a_min);
            (a, predict(model, a, params))
        })
        .collect()
}

fn power_range(points: &[(f64, f64)], curve: Option<&[(f64, f64)]>) -> Option<(f64, f64)> {
    let mut min_p = f64::INFINITY;
    let mut max_p = f64::NEG_INFINITY;

    for &(_, p) in points.iter().chain(curve.unwrap_or_default()) {
        min_p = min_p.min(p);
        max_p = max_p.max(p);
    }

    if min_p.is_finite() && max_p.is_finite() && max_p > min_p {
        Some((min_p, max_p))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(a: f64, a_min: f64, a_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((a - a_min) / (a_max - a_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(p: f64, p_min: f64, p_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((p - p_min) / (p_max - p_min)).clamp(0.0, 1.0);
    // max power -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], a_min: f64, a_max: f64, p_min: f64, p_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(a, p) in curve {
        let x = map_x(a, a_min, a_max, width);
        let y = map_y(p, p_min, p_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, y, '-');
        } else {
            grid[y][x] = '-';
        }
        prev = Some((x, y));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
