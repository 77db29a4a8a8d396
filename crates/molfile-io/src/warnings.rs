use std::fmt::Display;
use std::sync::Arc;

/// Side channel for codec warnings: recoverable oddities in a file are
/// reported here and parsing continues.
///
/// The sink is a value carried by each trajectory, not process state; the
/// default forwards to `log::warn!`.
#[derive(Clone)]
pub struct Warnings {
    sink: Arc<dyn Fn(&str) + Send + Sync>,
}

impl Warnings {
    pub fn new(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn warn(&self, component: &str, message: impl Display) {
        (self.sink)(&format!("[{component}] {message}"));
    }
}

impl Default for Warnings {
    fn default() -> Self {
        Self::new(|message| log::warn!(target: "molfile", "{message}"))
    }
}

impl std::fmt::Debug for Warnings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warnings").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn collects_through_the_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Warnings::new(move |message| seen.lock().unwrap().push(message.to_string()))
        };
        sink.warn("PDB reader", "ignoring unknown record");
        sink.warn("PDB writer", format_args!("value {} is too large", 42));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], "[PDB reader] ignoring unknown record");
        assert_eq!(seen[1], "[PDB writer] value 42 is too large");
    }
}
