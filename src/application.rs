//! Configuration for this application.
//!
//! The configuration is a single TOML file holding named archive and upload
//! profiles plus the `[deploy]` and `[backup]` sections. Unknown fields are
//! rejected while parsing; references between sections are checked by
//! [`Application::validate`] right after loading, so a command never starts
//! with a configuration it cannot finish.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;

use crate::archive::{
    Archiver, Level, RarArchiver, SevenZArchiver, TarArchiver, TarCompression, ZipArchiver,
    ZipCompression,
};
use crate::constants::{CONFIG_NAME, PKG_NAME};
use crate::deploy::{Deployment, EnvironmentRule};
use crate::path::expand_path;
use crate::process::ProcessRunner;
use crate::provider::DirectoryGroupProvider;
use crate::selector::Selectors;
use crate::upload::{S3Settings, S3Uploader, Uploader};
use crate::{Error, Result};

/// Selectors of a `[[deploy.environment]]` rule. A bad pattern there is a
/// configuration error, not a usage error.
fn environment_selectors(patterns: &[String]) -> Result<Selectors> {
    Selectors::new(patterns).map_err(|err| match err {
        Error::InvalidSelector { pattern, source } => Error::InvalidConfigSelector {
            section: "[[deploy.environment]]",
            pattern,
            source,
        },
        other => other,
    })
}

fn default_rar() -> String {
    "rar".to_string()
}

fn default_recovery() -> u8 {
    3
}

fn default_compose_command() -> Vec<String> {
    vec!["docker".to_string(), "compose".to_string()]
}

/// A named archive profile.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum ArchiverConfig {
    Rar {
        #[serde(default = "default_rar")]
        executable: String,
        #[serde(default)]
        password: Option<String>,
        /// Recovery record size, in percent.
        #[serde(default = "default_recovery")]
        recovery: u8,
        #[serde(default)]
        level: Level,
    },
    Tar {
        #[serde(default)]
        compression: TarCompression,
        #[serde(default)]
        level: Level,
    },
    Zip {
        #[serde(default)]
        compression: ZipCompression,
        #[serde(default)]
        level: Level,
    },
    #[serde(rename = "7z")]
    SevenZ {},
}

/// A named upload profile.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UploaderConfig {
    S3(S3Settings),
}

/// Environment variables injected into the services a selector list matches.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub selectors: Vec<String>,
    pub variables: BTreeMap<String, String>,
}

/// The `[deploy]` section.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Roots searched for compose stacks.
    pub directories: Vec<PathBuf>,
    #[serde(default = "default_compose_command")]
    pub compose_command: Vec<String>,
    #[serde(default)]
    pub environment: Vec<EnvironmentConfig>,
}

/// The `[backup]` section.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    pub destination: PathBuf,
    /// Name of an `[archivers.*]` profile.
    pub archiver: String,
    /// Name of an `[uploaders.*]` profile; uploads are skipped when absent.
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<PathBuf>>,
}

/// The whole configuration file.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Application {
    #[serde(default)]
    pub archivers: BTreeMap<String, ArchiverConfig>,
    #[serde(default)]
    pub uploaders: BTreeMap<String, UploaderConfig>,
    #[serde(default)]
    pub deploy: Option<DeployConfig>,
    #[serde(default)]
    pub backup: Option<BackupConfig>,
}

impl Application {
    /// Reads, parses and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let app: Self = toml::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        app.validate()?;
        Ok(app)
    }

    /// Checks cross references and values serde cannot.
    pub fn validate(&self) -> Result<()> {
        for config in self.archivers.values() {
            if let ArchiverConfig::Rar {
                executable,
                recovery,
                ..
            } = config
            {
                if executable.is_empty() {
                    return Err(Error::InvalidValue {
                        field: "archivers.*.executable",
                        reason: "must not be empty",
                    });
                }
                if *recovery > 100 {
                    return Err(Error::InvalidValue {
                        field: "archivers.*.recovery",
                        reason: "must be a percentage between 0 and 100",
                    });
                }
            }
        }
        for UploaderConfig::S3(settings) in self.uploaders.values() {
            if settings.bucket.is_empty() {
                return Err(Error::InvalidValue {
                    field: "uploaders.*.bucket",
                    reason: "must not be empty",
                });
            }
        }
        if let Some(deploy) = &self.deploy {
            if deploy.compose_command.is_empty() {
                return Err(Error::InvalidValue {
                    field: "deploy.compose_command",
                    reason: "must name at least the executable",
                });
            }
            for rule in &deploy.environment {
                environment_selectors(&rule.selectors)?;
            }
        }
        if let Some(backup) = &self.backup {
            if !self.archivers.contains_key(&backup.archiver) {
                return Err(Error::UnknownProfile {
                    section: "[backup]",
                    kind: "archiver",
                    name: backup.archiver.clone(),
                });
            }
            if let Some(uploader) = &backup.uploader {
                if !self.uploaders.contains_key(uploader) {
                    return Err(Error::UnknownProfile {
                        section: "[backup]",
                        kind: "uploader",
                        name: uploader.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Settings for `up` and `down`.
    pub fn deployment(&self) -> Result<Deployment> {
        let deploy = self.deploy.as_ref().ok_or(Error::MissingSection("deploy"))?;
        let environment = deploy
            .environment
            .iter()
            .map(|rule| {
                Ok(EnvironmentRule {
                    selectors: environment_selectors(&rule.selectors)?,
                    variables: rule.variables.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Deployment {
            directories: deploy.directories.iter().map(|dir| expand_path(dir)).collect(),
            compose_command: deploy.compose_command.clone(),
            environment,
        })
    }

    pub fn backup(&self) -> Result<&BackupConfig> {
        self.backup.as_ref().ok_or(Error::MissingSection("backup"))
    }

    /// Backup groups with `~` expanded.
    pub fn backup_groups(&self) -> Result<DirectoryGroupProvider> {
        let groups = self
            .backup()?
            .groups
            .iter()
            .map(|(name, dirs)| (name.clone(), dirs.iter().map(|dir| expand_path(dir)).collect()))
            .collect::<BTreeMap<String, Vec<PathBuf>>>();
        Ok(DirectoryGroupProvider::from(&groups))
    }

    /// Builds the archiver named `name`.
    pub fn archiver(&self, name: &str, runner: Rc<dyn ProcessRunner>) -> Result<Archiver> {
        let config = self.archivers.get(name).ok_or_else(|| Error::UnknownProfile {
            section: "[backup]",
            kind: "archiver",
            name: name.to_string(),
        })?;
        Ok(match config {
            ArchiverConfig::Rar {
                executable,
                password,
                recovery,
                level,
            } => Archiver::Rar(RarArchiver::new(
                executable.clone(),
                password.clone(),
                *recovery,
                *level,
                runner,
            )),
            ArchiverConfig::Tar { compression, level } => {
                Archiver::Tar(TarArchiver::new(*compression, *level))
            }
            ArchiverConfig::Zip { compression, level } => {
                Archiver::Zip(ZipArchiver::new(*compression, *level))
            }
            ArchiverConfig::SevenZ {} => Archiver::SevenZ(SevenZArchiver),
        })
    }

    /// Builds the uploader named `name`.
    pub fn uploader(&self, name: &str) -> Result<Box<dyn Uploader>> {
        let config = self.uploaders.get(name).ok_or_else(|| Error::UnknownProfile {
            section: "[backup]",
            kind: "uploader",
            name: name.to_string(),
        })?;
        Ok(match config {
            UploaderConfig::S3(settings) => Box::new(S3Uploader::new(settings.clone())),
        })
    }
}

/// Returns the absolute path to the default configuration file.
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(not(target_os = "macos"))]
fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(PKG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(target_os = "macos")]
fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join(PKG_NAME))
}
