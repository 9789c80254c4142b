//! Progress notification for long runs

/// Receives `(current, total)` after each completed output step
pub trait ProgressObserver {
    fn notify(&mut self, current: usize, total: usize);

    /// Called once after the last step of a successful run
    fn finish(&mut self) {}
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl ProgressObserver for Silent {
    fn notify(&mut self, _current: usize, _total: usize) {}
}

impl<F: FnMut(usize, usize)> ProgressObserver for F {
    fn notify(&mut self, current: usize, total: usize) {
        self(current, total)
    }
}

/// Terminal progress bar, created lazily on the first notification
#[cfg(feature = "progress")]
#[derive(Debug, Default)]
pub struct ProgressBarObserver {
    bar: Option<indicatif::ProgressBar>,
}

#[cfg(feature = "progress")]
impl ProgressBarObserver {
    const TEMPLATE: &'static str = "{bar:40.cyan/blue} {pos}/{len} steps ({eta})";

    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "progress")]
impl ProgressObserver for ProgressBarObserver {
    fn notify(&mut self, current: usize, total: usize) {
        let bar = self.bar.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            if let Ok(style) = indicatif::ProgressStyle::with_template(Self::TEMPLATE) {
                bar.set_style(style);
            }
            bar
        });
        bar.set_position(current as u64);
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |current: usize, total: usize| seen.push((current, total));
            observer.notify(1, 2);
            observer.notify(2, 2);
            observer.finish();
        }
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
    }

    #[cfg(feature = "progress")]
    #[test]
    fn test_progress_bar_finishes_cleanly() {
        let mut observer = ProgressBarObserver::new();
        observer.notify(1, 10);
        observer.notify(10, 10);
        observer.finish();
        assert!(observer.bar.is_none());
    }
}
