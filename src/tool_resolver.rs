//! # Tool Path Resolver
//!
//! This module handles finding the external optimizers:
//! - Bundled in a tools directory shipped next to the application
//! - System-installed tools on `PATH`
//!
//! Bundled executables carry a platform suffix on Windows (`jpegtran.exe`),
//! and are looked up directly inside the tools directory. When nothing is
//! found the bare tool name is returned, so a missing executable surfaces as
//! a spawn failure naming the tool instead of a silent skip.

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment override for the bundled tools directory
pub const TOOLS_DIR_ENV: &str = "IMG_TOOLS_DIR";

/// Every external tool the optimizer profiles can launch
pub const KNOWN_TOOLS: &[(&str, &str)] = &[
    ("jpegtran", "lossless JPEG re-encode"),
    ("optipng", "lossless PNG re-encode"),
    ("cjpeg", "quality-controlled JPEG encode from PPM"),
];

/// Tool path resolver for bundled and system-installed optimizers
#[derive(Debug, Clone)]
pub struct ToolPathResolver {
    /// Base directory where tools are bundled
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver using an explicit tools directory, or `IMG_TOOLS_DIR`
    pub fn new(tools_dir: Option<PathBuf>) -> Self {
        let tools_dir = tools_dir.or_else(Self::detect_bundled_tools_dir);
        debug!("Tools directory: {:?}", tools_dir);
        Self { tools_dir }
    }

    fn detect_bundled_tools_dir() -> Option<PathBuf> {
        let tools_path = PathBuf::from(env::var_os(TOOLS_DIR_ENV)?);
        if tools_path.is_dir() {
            debug!("Found tools directory via {}: {:?}", TOOLS_DIR_ENV, tools_path);
            Some(tools_path)
        } else {
            warn!("{} points to a missing directory: {:?}", TOOLS_DIR_ENV, tools_path);
            None
        }
    }

    /// Platform-specific executable file name for a tool
    pub fn executable_name(tool_name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", tool_name)
        } else {
            tool_name.to_string()
        }
    }

    /// Resolve the path to a tool, without checking that the result exists
    pub fn resolve(&self, tool_name: &str) -> PathBuf {
        self.find(tool_name)
            .unwrap_or_else(|| PathBuf::from(Self::executable_name(tool_name)))
    }

    /// Resolve the path to a tool, returning `None` if it cannot be found
    pub fn find(&self, tool_name: &str) -> Option<PathBuf> {
        if let Some(ref tools_dir) = self.tools_dir {
            let bundled_path = tools_dir.join(Self::executable_name(tool_name));
            if bundled_path.is_file() {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled_path);
                return Some(bundled_path);
            }
            debug!("Bundled path does not exist: {:?}", bundled_path);
        }

        let system_path = Self::find_in_system_path(tool_name);
        if let Some(ref path) = system_path {
            debug!("Using system tool: {} -> {:?}", tool_name, path);
        }
        system_path
    }

    /// Find tool in system PATH
    fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
        let executable = Self::executable_name(tool_name);
        env::split_paths(&env::var_os("PATH")?)
            .map(|dir| dir.join(&executable))
            .find(|path| path.is_file())
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.find(tool_name).is_some()
    }

    /// The configured bundled tools directory, if any
    pub fn tools_dir(&self) -> Option<&Path> {
        self.tools_dir.as_deref()
    }

    /// Get a report of tool availability
    pub fn get_tools_report(&self) -> String {
        let mut report = String::new();
        report.push_str("Tool Path Resolver Report\n");
        report.push_str(&format!("Bundled tools dir: {:?}\n", self.tools_dir));
        report.push_str("\nTool Availability:\n");

        for (tool, description) in KNOWN_TOOLS {
            match self.find(tool) {
                Some(path) => report.push_str(&format!("  ✅ {} -> {:?} ({})\n", tool, path, description)),
                None => report.push_str(&format!(
                    "  ❌ {} (not found, install with: {})\n",
                    tool,
                    Self::install_hint(tool)
                )),
            }
        }

        report
    }

    /// Installation hint for a tool on Debian-like systems
    fn install_hint(tool_name: &str) -> &'static str {
        match tool_name {
            "jpegtran" | "cjpeg" => "sudo apt-get install libjpeg-turbo-progs",
            "optipng" => "sudo apt-get install optipng",
            _ => "your package manager",
        }
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new(None)
    }
}
