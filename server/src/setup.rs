use std::env;
use std::env::VarError;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Get the database URL from the environment variable.
pub fn get_database_url_from_env() -> Result<String, SetupError> {
    env::var("DATABASE_URL").map_err(|e| SetupError::from_env_error(e, "DATABASE_URL"))
}

/// Get the path of the duty board configuration file (JSON) from the environment variable
pub fn get_board_config_path_from_env() -> Result<PathBuf, SetupError> {
    env::var("DUTY_BOARD_CONFIG")
        .map(PathBuf::from)
        .map_err(|e| SetupError::from_env_error(e, "DUTY_BOARD_CONFIG"))
}

/// Get the web server TCP listening port from the environment variable
pub fn get_listen_port_from_env() -> Result<u16, SetupError> {
    env::var("LISTEN_PORT")
        .map_err(|e| SetupError::from_env_error(e, "LISTEN_PORT"))
        .and_then(|v| parse_port(&v, "LISTEN_PORT"))
}

/// Get the web server TCP listening interface address from the environment variable
pub fn get_listen_address_from_env() -> Result<String, SetupError> {
    env::var("LISTEN_ADDRESS").map_err(|e| SetupError::from_env_error(e, "LISTEN_ADDRESS"))
}

/// Get the TCP port for the Prometheus metrics listener of the background workers from the
/// environment variable. Returns `None` if it is not set, i.e. the metrics are not exposed.
pub fn get_metrics_listen_port_from_env() -> Result<Option<u16>, SetupError> {
    match env::var("METRICS_LISTEN_PORT") {
        Ok(v) => parse_port(&v, "METRICS_LISTEN_PORT").map(Some),
        Err(VarError::NotPresent) => Ok(None),
        Err(e) => Err(SetupError::from_env_error(e, "METRICS_LISTEN_PORT")),
    }
}

/// Get the distinguished name and password of the LDAP service account from the environment
/// variables
pub fn get_ldap_credentials_from_env() -> Result<(String, String), SetupError> {
    Ok((
        env::var("LDAP_BIND_DN").map_err(|e| SetupError::from_env_error(e, "LDAP_BIND_DN"))?,
        env::var("LDAP_PASSWORD").map_err(|e| SetupError::from_env_error(e, "LDAP_PASSWORD"))?,
    ))
}

fn parse_port(value: &str, variable_name: &'static str) -> Result<u16, SetupError> {
    value.parse().map_err(|_| SetupError::EnvVariableInvalid {
        variable_name,
        problem: "Not a valid uint16",
    })
}

#[derive(Debug)]
pub enum SetupError {
    EnvVariableMissing {
        variable_name: &'static str,
    },
    EnvVariableInvalid {
        variable_name: &'static str,
        problem: &'static str,
    },
}

impl SetupError {
    fn from_env_error(error: VarError, variable_name: &'static str) -> Self {
        match error {
            VarError::NotPresent => Self::EnvVariableMissing { variable_name },
            VarError::NotUnicode(_) => Self::EnvVariableInvalid {
                variable_name,
                problem: "no valid unicode",
            },
        }
    }
}

impl Display for SetupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupError::EnvVariableMissing { variable_name } => {
                write!(f, "Environment variable {} must be defined", variable_name)
            }
            SetupError::EnvVariableInvalid {
                variable_name,
                problem,
            } => write!(
                f,
                "Value of environment variable {} is invalid: {}",
                variable_name, problem
            ),
        }
    }
}

impl std::error::Error for SetupError {}
