//! ICO sizing. Icons only come in a handful of square sizes, so every size
//! policy snaps to one of them and the frame is padded with transparency.

use crate::converter::SizePolicy;

/// Standard icon edge lengths, ascending.
pub const ICO_SIZES: [u32; 7] = [16, 24, 32, 48, 64, 128, 256];

/// Thresholds on `max(iw,ih)` used when the original size is kept.
const ORIGINAL_THRESHOLDS: [(u32, u32); 6] =
    [(192, 256), (96, 128), (56, 64), (40, 48), (28, 32), (20, 24)];

fn largest_within(limit: u32) -> u32 {
    ICO_SIZES
        .iter()
        .rev()
        .copied()
        .find(|s| *s <= limit)
        .unwrap_or(ICO_SIZES[0])
}

fn smallest_above(limit: u32) -> u32 {
    ICO_SIZES
        .iter()
        .copied()
        .find(|s| *s >= limit)
        .unwrap_or(ICO_SIZES[ICO_SIZES.len() - 1])
}

/// Closest standard size; ties go to the smaller one.
fn closest(target: u32) -> u32 {
    let mut best = ICO_SIZES[0];
    for size in ICO_SIZES.iter().copied().skip(1) {
        if size.abs_diff(target) < best.abs_diff(target) {
            best = size;
        }
    }
    best
}

/// Standard size for a policy. `None` means "pick at run time" and applies
/// to [`SizePolicy::Original`] only.
pub fn icon_size(size: &SizePolicy) -> Option<u32> {
    match *size {
        SizePolicy::Original => None,
        SizePolicy::MaxWidth(v) | SizePolicy::MaxHeight(v) | SizePolicy::MaxSide(v) => {
            Some(largest_within(v))
        }
        SizePolicy::MinWidth(v) | SizePolicy::MinHeight(v) | SizePolicy::MinSide(v) => {
            Some(smallest_above(v))
        }
        SizePolicy::Exact { width, height } => match (width, height) {
            (Some(w), Some(h)) => Some(closest(w.max(h))),
            (Some(v), None) | (None, Some(v)) => Some(closest(v)),
            (None, None) => Some(ICO_SIZES[ICO_SIZES.len() - 1]),
        },
    }
}

/// ffmpeg expression choosing a standard size from the intrinsic frame.
fn original_size_expr() -> String {
    let mut expr = ICO_SIZES[0].to_string();
    for (threshold, size) in ORIGINAL_THRESHOLDS.iter().rev() {
        expr = format!(
            "if(gte(max(iw\\,ih)\\,{})\\,{}\\,{})",
            threshold, size, expr
        );
    }
    expr
}

/// Scale-then-pad filter producing a square icon on a transparent canvas.
pub fn icon_filter(size: &SizePolicy) -> String {
    let target = match icon_size(size) {
        Some(px) => px.to_string(),
        None => original_size_expr(),
    };
    format!(
        "scale='min(iw,{t})':'min(ih,{t})':flags=lanczos,pad={t}:{t}:(ow-iw)/2:(oh-ih)/2:color=0x00000000",
        t = target
    )
}
