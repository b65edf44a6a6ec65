// -------------------------------------------------------------------------------------------------
// ---- LogLevel -----------------------------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// `EnvFilter` directive: the chosen level for pgswitch itself, dependencies
    /// capped at warn unless tracing everything.
    pub fn filter_directive(self) -> String {
        match self {
            LogLevel::Trace => "trace".to_string(),
            LogLevel::Error => "error".to_string(),
            level => format!("warn,pgswitch={}", level.as_str()),
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ---- Tests --------------------------------------------------------------------------------------


// -------------------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------
