/*
 * Created on Tue Sep 29 2020
 *
 * This file is a part of Kestrel
 * Kestrel is a free and open-source in-memory key/value database that aims
 * to provide a simple, predictable data server for many concurrent clients
 * over plain TCP.
 *
 * Copyright (c) 2020, The Kestrel developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Configuration tools and methods
//!
//! Configuration can come from exactly one of three sources: command-line
//! arguments, `KESTREL_*` environment variables or a TOML configuration
//! file passed with `--config`. Mixing sources is ambiguous and is reported
//! as a conflict instead of being silently merged.

// external imports
use clap::{load_yaml, App, ArgMatches};
use serde::Deserialize;
// std imports
use std::env::{self, VarError};
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
// internal imports
use crate::dbnet::MAXIMUM_CONNECTION_LIMIT;

// server defaults
const DEFAULT_IPV4: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
const DEFAULT_PORT: u16 = 31337;
const DEFAULT_MAXCON: usize = 64;

#[derive(Debug, Clone, PartialEq)]
/// The resolved server configuration
pub struct ServerConfig {
    /// The host to bind to
    pub host: IpAddr,
    /// The port to bind to
    pub port: u16,
    /// The maximum number of clients served concurrently
    pub maxcon: usize,
    /// Whether the startup banner should skip the terminal art
    pub noart: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_IPV4,
            port: DEFAULT_PORT,
            maxcon: DEFAULT_MAXCON,
            noart: false,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
/// The shape of a `--config` TOML file
pub struct ConfigFile {
    /// The `[server]` table
    pub server: ConfigFileServer,
}

#[derive(Debug, Deserialize, PartialEq)]
/// The `[server]` table of a configuration file. Absent keys fall back to
/// the defaults
pub struct ConfigFileServer {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub maxcon: Option<usize>,
    pub noart: Option<bool>,
}

#[derive(Debug)]
/// Errors that can happen while resolving the configuration
pub enum ConfigError {
    /// The configuration file couldn't be read
    OSError(std::io::Error),
    /// The configuration file isn't valid TOML
    ConfigFileParseError(toml::de::Error),
    /// More than one configuration source was supplied
    Conflict,
    /// A value failed to parse or is out of range
    CfgError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::OSError(e) => write!(f, "error: {}", e),
            ConfigError::ConfigFileParseError(e) => {
                write!(f, "Couldn't parse the configuration file: {}", e)
            }
            ConfigError::Conflict => write!(
                f,
                "error: Conflicting configuration sources. Supply either command-line \
                 arguments, environment variables or a configuration file"
            ),
            ConfigError::CfgError(e) => write!(f, "error: {}", e),
        }
    }
}

#[derive(Debug, PartialEq)]
/// The type of configuration the server was started with
pub enum ConfigType {
    /// The default configuration; no source was supplied
    Def(ServerConfig),
    /// A user-supplied configuration
    Custom(ServerConfig),
}

/// Resolve the configuration from the command line, the environment or a
/// configuration file
pub fn get_config() -> Result<ConfigType, ConfigError> {
    // initialize clap because that will let us check for CLI/file configs
    let cfg_layout = load_yaml!("../../cli.yml");
    let matches = App::from_yaml(cfg_layout).get_matches();
    get_config_from_matches(&matches)
}

fn get_config_from_matches(matches: &ArgMatches) -> Result<ConfigType, ConfigError> {
    // get config from file
    let cfg_from_file = if let Some(file) = matches.value_of("config") {
        let file = fs::read(file).map_err(ConfigError::OSError)?;
        let cfg_file: ConfigFile =
            toml::from_slice(&file).map_err(ConfigError::ConfigFileParseError)?;
        Some(from_file(cfg_file))
    } else {
        None
    };
    // get config from CLI
    let cfg_from_cli = parse_cli_args(matches)?;
    // get config from env
    let cfg_from_env = parse_env_config()?;
    // calculate the number of config sources
    let cfg_degree =
        cfg_from_cli.is_some() as u8 + cfg_from_env.is_some() as u8 + cfg_from_file.is_some() as u8;
    // if degree is more than 1, there is a conflict
    if cfg_degree > 1 {
        return Err(ConfigError::Conflict);
    }
    let noart = matches.is_present("noart");
    let ret = match cfg_from_file.or(cfg_from_cli).or(cfg_from_env) {
        Some(mut cfg) => {
            cfg.noart = cfg.noart || noart;
            validate(&cfg)?;
            ConfigType::Custom(cfg)
        }
        None => {
            // no configuration, use default
            let mut cfg = ServerConfig::default();
            cfg.noart = noart;
            ConfigType::Def(cfg)
        }
    };
    Ok(ret)
}

/// Fold a parsed configuration file over the defaults
fn from_file(file: ConfigFile) -> ServerConfig {
    let default = ServerConfig::default();
    ServerConfig {
        host: file.server.host.unwrap_or(default.host),
        port: file.server.port.unwrap_or(default.port),
        maxcon: file.server.maxcon.unwrap_or(default.maxcon),
        noart: file.server.noart.unwrap_or(default.noart),
    }
}

/// Parse the command-line arguments into a configuration, if any of the
/// configuration arguments were supplied at all
fn parse_cli_args(matches: &ArgMatches) -> Result<Option<ServerConfig>, ConfigError> {
    let host = matches.value_of("host");
    let port = matches.value_of("port");
    let maxcon = matches.value_of("maxcon");
    if host.is_none() && port.is_none() && maxcon.is_none() {
        return Ok(None);
    }
    let mut cfg = ServerConfig::default();
    if let Some(host) = host {
        cfg.host = host
            .parse()
            .map_err(|_| ConfigError::CfgError("Invalid value for `--host`".to_owned()))?;
    }
    if let Some(port) = port {
        cfg.port = port
            .parse()
            .map_err(|_| ConfigError::CfgError("Invalid value for `--port`".to_owned()))?;
    }
    if let Some(maxcon) = maxcon {
        cfg.maxcon = maxcon
            .parse()
            .map_err(|_| ConfigError::CfgError("Invalid value for `--maxcon`".to_owned()))?;
    }
    Ok(Some(cfg))
}

/// Parse the `KESTREL_*` environment variables into a configuration, if any
/// of them are set
fn parse_env_config() -> Result<Option<ServerConfig>, ConfigError> {
    let host = env_var("KESTREL_HOST")?;
    let port = env_var("KESTREL_PORT")?;
    let maxcon = env_var("KESTREL_MAXCON")?;
    if host.is_none() && port.is_none() && maxcon.is_none() {
        return Ok(None);
    }
    let mut cfg = ServerConfig::default();
    if let Some(host) = host {
        cfg.host = host
            .parse()
            .map_err(|_| ConfigError::CfgError("Invalid value for `KESTREL_HOST`".to_owned()))?;
    }
    if let Some(port) = port {
        cfg.port = port
            .parse()
            .map_err(|_| ConfigError::CfgError("Invalid value for `KESTREL_PORT`".to_owned()))?;
    }
    if let Some(maxcon) = maxcon {
        cfg.maxcon = maxcon
            .parse()
            .map_err(|_| ConfigError::CfgError("Invalid value for `KESTREL_MAXCON`".to_owned()))?;
    }
    Ok(Some(cfg))
}

fn env_var(key: &str) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::CfgError(format!(
            "The value for `{}` is not valid unicode",
            key
        ))),
    }
}

/// Reject configurations the server can't actually run with
fn validate(cfg: &ServerConfig) -> Result<(), ConfigError> {
    if cfg.maxcon == 0 || cfg.maxcon > MAXIMUM_CONNECTION_LIMIT {
        return Err(ConfigError::CfgError(format!(
            "`maxcon` must be between 1 and {}",
            MAXIMUM_CONNECTION_LIMIT
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(args: Vec<&str>) -> Result<ConfigType, ConfigError> {
        let cfg_layout = load_yaml!("../../cli.yml");
        let matches = App::from_yaml(cfg_layout).get_matches_from(args);
        get_config_from_matches(&matches)
    }

    #[test]
    fn test_no_args_yields_the_default_config() {
        match config_from(vec!["kestreld"]).unwrap() {
            ConfigType::Def(cfg) => assert_eq!(cfg, ServerConfig::default()),
            other => panic!("expected the default config, got: {:?}", other),
        }
    }

    #[test]
    fn test_cli_args_yield_a_custom_config() {
        match config_from(vec!["kestreld", "--port", "2003", "--maxcon", "10"]).unwrap() {
            ConfigType::Custom(cfg) => {
                assert_eq!(cfg.host, DEFAULT_IPV4);
                assert_eq!(cfg.port, 2003);
                assert_eq!(cfg.maxcon, 10);
            }
            other => panic!("expected a custom config, got: {:?}", other),
        }
    }

    #[test]
    fn test_bad_cli_values_are_reported() {
        assert!(matches!(
            config_from(vec!["kestreld", "--port", "notaport"]),
            Err(ConfigError::CfgError(_))
        ));
    }

    #[test]
    fn test_config_file_parsing() {
        let toml = "[server]\nhost = \"0.0.0.0\"\nport = 2003\n";
        let file: ConfigFile = toml::from_str(toml).unwrap();
        let cfg = from_file(file);
        assert_eq!(cfg.host, "0.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(cfg.port, 2003);
        // absent keys fall back to the defaults
        assert_eq!(cfg.maxcon, DEFAULT_MAXCON);
        assert!(!cfg.noart);
    }

    #[test]
    fn test_maxcon_bounds() {
        let mut cfg = ServerConfig::default();
        cfg.maxcon = 0;
        assert!(validate(&cfg).is_err());
        cfg.maxcon = MAXIMUM_CONNECTION_LIMIT + 1;
        assert!(validate(&cfg).is_err());
        cfg.maxcon = MAXIMUM_CONNECTION_LIMIT;
        assert!(validate(&cfg).is_ok());
    }
}
