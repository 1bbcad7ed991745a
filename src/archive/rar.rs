use std::collections::BTreeMap;
use std::fmt;
use std::path::{self, Path};
use std::rc::Rc;

use super::{ArchivalStatus, ArchiveBackend, Level, prepare};
use crate::process::ProcessRunner;

const PASSWORD_FLAG: &str = "-hp";

/// Archives through the external `rar` tool.
#[derive(Clone)]
pub struct RarArchiver {
    executable: String,
    password: Option<String>,
    recovery: u8,
    level: Level,
    runner: Rc<dyn ProcessRunner>,
}

impl fmt::Debug for RarArchiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RarArchiver")
            .field("executable", &self.executable)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("recovery", &self.recovery)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl RarArchiver {
    pub fn new(
        executable: impl Into<String>,
        password: Option<String>,
        recovery: u8,
        level: Level,
        runner: Rc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            executable: executable.into(),
            password,
            recovery,
            level,
            runner,
        }
    }

    /// `rar a -r -rr<N>% -m<0..5> [-hp<password>] -ep1 <archive> <folder>`
    pub fn command(&self, folder: &Path, archive: &Path) -> Vec<String> {
        let mut cmd = vec![
            self.executable.clone(),
            "a".to_string(),
            "-r".to_string(),
            format!("-rr{}%", self.recovery),
            format!("-m{}", self.level.scale([1, 2, 3, 4, 5])),
        ];
        if let Some(password) = &self.password {
            cmd.push(format!("{PASSWORD_FLAG}{password}"));
        }
        cmd.push("-ep1".to_string());
        cmd.push(archive.to_string_lossy().into_owned());
        cmd.push(folder.to_string_lossy().into_owned());
        cmd
    }

    pub(super) fn archive(&self, folder: &Path, archive: &Path) -> ArchivalStatus {
        // rar runs next to the folder, so relative paths would resolve twice.
        let resolved = path::absolute(folder)
            .and_then(|folder| Ok((folder, path::absolute(archive)?)));
        let (folder_path, archive_path) = match resolved {
            Ok(paths) => paths,
            Err(err) => return failed(folder, archive, format!("cannot resolve paths: {err}")),
        };
        let (folder, archive) = (folder_path.as_path(), archive_path.as_path());
        if let Err(err) = prepare(archive) {
            return failed(folder, archive, format!("{err:#}"));
        }
        let cmd = self.command(folder, archive);
        let mut process = self.runner.run(&cmd, folder.parent(), &BTreeMap::new());
        // The record ends up in reports; keep the password out of it.
        for arg in &mut process.cmd {
            if arg.starts_with(PASSWORD_FLAG) {
                *arg = format!("{PASSWORD_FLAG}***");
            }
        }
        ArchivalStatus {
            folder: folder.to_path_buf(),
            archive: archive.to_path_buf(),
            started: process.started,
            completed: process.completed,
            backend: ArchiveBackend::Process(process),
        }
    }
}

fn failed(folder: &Path, archive: &Path, error: String) -> ArchivalStatus {
    let now = Some(chrono::Local::now());
    ArchivalStatus {
        folder: folder.to_path_buf(),
        archive: archive.to_path_buf(),
        started: now,
        completed: now,
        backend: ArchiveBackend::Builtin { error: Some(error) },
    }
}
