use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Console progress bars for a pipeline run
///
/// One overall bar counting stages plus a spinner per running task.
pub struct ProgressMonitor {
    multi: MultiProgress,
    overall: ProgressBar,
    task_bars: HashMap<String, ProgressBar>,
    enabled: bool,
    ascii: bool,
}

impl ProgressMonitor {
    /// `enabled = false` yields a monitor that ignores every call (JSONL
    /// output, non-tty stderr).
    pub fn new(total_stages: usize, enabled: bool, ascii: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                task_bars: HashMap::new(),
                enabled: false,
                ascii,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_stages as u64));
        let chars = if ascii { "#>-" } else { "█▓▒░  " };
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} stages {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(chars);
        overall.set_style(style);
        overall.set_message("starting");

        Self {
            multi,
            overall,
            task_bars: HashMap::new(),
            enabled: true,
            ascii,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn start_stage(&self, step: usize, total: usize, name: &str) {
        if self.enabled {
            self.overall.set_message(format!("stage {step}/{total}: {name}"));
        }
    }

    pub fn add_task(&mut self, task: &str) {
        if !self.enabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        let ticks: &[&str] = if self.ascii {
            &["|", "/", "-", "\\"]
        } else {
            &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]
        };
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(ticks),
        );
        bar.set_message(task.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        self.task_bars.insert(task.to_string(), bar);
    }

    pub fn retry_task(&self, task: &str, attempt: u32) {
        if let Some(bar) = self.task_bars.get(task) {
            bar.set_message(format!("{task} (retry after attempt {attempt})"));
        }
    }

    pub fn complete_task(&mut self, task: &str, success: bool, duration_ms: u64) {
        if !self.enabled {
            return;
        }

        if let Some(bar) = self.task_bars.remove(task) {
            let icon = match (success, self.ascii) {
                (true, true) => "[ok]",
                (false, true) => "[x]",
                (true, false) => "✅",
                (false, false) => "❌",
            };
            bar.finish_with_message(format!("{icon} {task} ({duration_ms}ms)"));
        }
    }

    pub fn finish_stage(&self) {
        if self.enabled {
            self.overall.inc(1);
        }
    }

    pub fn finish(&self, success: bool) {
        if !self.enabled {
            return;
        }

        let msg = if success {
            "all stages completed"
        } else {
            "run failed"
        };
        self.overall.finish_with_message(msg);
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        for (_, bar) in self.task_bars.drain() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_monitor_disabled() {
        let mut monitor = ProgressMonitor::new(3, false, false);

        monitor.start_stage(1, 3, "outline");
        monitor.add_task("draft");
        monitor.complete_task("draft", true, 100);
        monitor.finish_stage();
        monitor.finish(true);
        assert!(!monitor.is_enabled());
    }

    #[test]
    fn test_progress_monitor_ascii() {
        let mut monitor = ProgressMonitor::new(2, true, true);

        monitor.start_stage(1, 2, "fan-out");
        monitor.add_task("a");
        monitor.add_task("b");
        monitor.retry_task("a", 1);
        monitor.complete_task("a", true, 100);
        monitor.complete_task("b", false, 200);
        monitor.finish_stage();
        monitor.finish(false);
    }
}
