use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar shown while fetching log sub-ranges
pub fn create_progress_bar(total_steps: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total_steps);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{elapsed_precise}} {label} {{bar:40.green/white}} {{pos}}/{{len}} ranges {{msg}}"
            ))
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.tick();
    pb
}
