use crate::error::{ConfigError, Result};
use crate::settings::{ServeConfig, INDEX_HTML};
use std::collections::HashSet;

impl ServeConfig {
    /// Validate the configuration before the server is constructed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the compiler name is empty
    /// - a route name is empty, contains `/`, or collides with another route
    /// - the package directory or prebuilt artifact does not exist
    pub fn validate(&self) -> Result<()> {
        if self.compiler.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "compiler".into(),
                hint: "Set compiler to \"go\" or \"tinygo\"".into(),
            });
        }

        let routes = [
            ("artifactName", &self.artifact_name),
            ("runtimeScriptName", &self.runtime_script_name),
            ("waitEndpoint", &self.wait_endpoint),
            ("notifyEndpoint", &self.notify_endpoint),
        ];

        let mut seen: HashSet<&str> = HashSet::from([INDEX_HTML, "."]);
        for (field, name) in routes {
            validate_route_name(field, name)?;
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::invalid(
                    field,
                    name.as_str(),
                    "Route names must be distinct from each other and from index.html",
                ));
            }
        }

        match &self.prebuilt {
            Some(path) if !path.is_file() => Err(ConfigError::invalid(
                "prebuilt",
                path.display().to_string(),
                "Prebuilt artifact does not exist",
            )),
            Some(_) => Ok(()),
            None if !self.wasm_dir.is_dir() => Err(ConfigError::invalid(
                "wasmDir",
                self.wasm_dir.display().to_string(),
                "Package directory does not exist",
            )),
            None => Ok(()),
        }
    }
}

fn validate_route_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(ConfigError::invalid(
            field,
            name,
            "Route names are single path segments without separators",
        ));
    }
    Ok(())
}
