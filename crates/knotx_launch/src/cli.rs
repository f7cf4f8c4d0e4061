//! Command-line interface for knotx_launch

use argh::FromArgs;
use std::time::Duration;

/// deploy the configured Knot.x modules and redeploy them on configuration change
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to the bootstrap file (default: conf/bootstrap.yaml)
    #[argh(positional, default = "String::from(\"conf/bootstrap.yaml\")")]
    pub bootstrap: String,

    /// define a system property (format: key=value)
    #[argh(option, short = 'D', from_str_fn(parse_property))]
    pub define: Vec<(String, String)>,

    /// additional property file, consulted after the system properties
    #[argh(option)]
    pub properties: Vec<String>,

    /// resolve and fetch the configuration, print the module list and exit
    #[argh(switch)]
    pub validate: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,

    /// grace period in milliseconds before stopping modules are killed
    #[argh(option, default = "5000")]
    pub shutdown_timeout_ms: u64,
}

/// Parse property definition in format "key=value"
fn parse_property(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!(
            "Invalid property format '{}'. Expected 'key=value'",
            s
        )),
    }
}

impl LaunchArgs {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Effective log filter; unknown levels fall back to info
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property() {
        let result = parse_property("knotx.home=/opt/knotx");
        assert_eq!(
            result,
            Ok(("knotx.home".to_string(), "/opt/knotx".to_string()))
        );
    }

    #[test]
    fn test_parse_property_with_equals() {
        let result = parse_property("query=a=b");
        assert_eq!(result, Ok(("query".to_string(), "a=b".to_string())));
    }

    #[test]
    fn test_parse_property_empty_value() {
        let result = parse_property("knotx.home=");
        assert_eq!(result, Ok(("knotx.home".to_string(), String::new())));
    }

    #[test]
    fn test_parse_property_invalid() {
        assert!(parse_property("invalid").is_err());
        assert!(parse_property("=value").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = LaunchArgs::from_args(&["knotx_launch"], &[]).unwrap();
        assert_eq!(args.bootstrap, "conf/bootstrap.yaml");
        assert!(args.define.is_empty());
        assert_eq!(args.log_filter(), "info");
        assert_eq!(args.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_args_full() {
        let args = LaunchArgs::from_args(
            &["knotx_launch"],
            &[
                "conf/dev.yaml",
                "-D",
                "knotx.home=/opt/knotx",
                "-D",
                "profile=dev",
                "--properties",
                "conf/local.yaml",
                "--validate",
                "-l",
                "DEBUG",
                "--shutdown-timeout-ms",
                "250",
            ],
        )
        .unwrap();

        assert_eq!(args.bootstrap, "conf/dev.yaml");
        assert_eq!(args.define.len(), 2);
        assert_eq!(args.define[1], ("profile".to_string(), "dev".to_string()));
        assert_eq!(args.properties, vec!["conf/local.yaml".to_string()]);
        assert!(args.validate);
        assert_eq!(args.log_filter(), "debug");
        assert_eq!(args.shutdown_timeout(), Duration::from_millis(250));
    }
}
