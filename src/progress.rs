//! Progress reporting: one bar per source counting emitted records.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
     rec/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} {pos} records  rec/s: {per_sec}  elapsed: {elapsed_precise}";

/// Count-style bar when the row ceiling is known, a spinner otherwise.
/// Bars are attached to `mp` when several sources render at once.
pub fn make_record_progress(mp: Option<&MultiProgress>, label: &str, total: Option<u64>) -> ProgressBar {
    let pb = match total {
        Some(n) => ProgressBar::new(n),
        None => ProgressBar::new_spinner(),
    };
    let pb = match mp {
        Some(mp) => mp.add(pb),
        None => pb,
    };
    let template = if total.is_some() { BAR_TEMPLATE } else { SPINNER_TEMPLATE };
    let style = ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
