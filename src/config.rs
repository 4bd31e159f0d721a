/// Settings for one interpreter instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Nested calls allowed before the run is aborted.
    pub max_call_depth: usize,
    /// Exposed to scripts as `std::args`.
    pub script_args: Vec<String>,
    pub program_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            script_args: Vec::new(),
            program_name: None,
        }
    }
}

impl Config {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_script_args(mut self, args: Vec<String>) -> Self {
        self.script_args = args;
        self
    }

    pub fn with_program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = Some(name.into());
        self
    }

    /// Name of the root module, `main` when nothing was given.
    pub fn root_name(&self) -> &str {
        self.program_name.as_deref().unwrap_or("main")
    }
}
