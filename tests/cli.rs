use assert_cmd::prelude::*;
use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// A config file backing up `<temp>/srv/media/{config,db}` and `<temp>/home/notes`
/// into `<temp>/backups` with the given archiver profile.
fn backup_config(temp: &assert_fs::TempDir, archiver: &str) -> TestResult<ChildPath> {
    temp.child("srv/media/config/app.ini").write_str("[app]\nname = media\n")?;
    temp.child("srv/media/db/data.sql").write_str("create table t (id int);\n")?;
    temp.child("home/notes/todo.md").write_str("- water plants\n")?;
    let root = temp.path().display();
    let config = temp.child("config.toml");
    config.write_str(&format!(
        r#"
[archivers.default]
{archiver}

[backup]
destination = '{root}/backups'
archiver = "default"

[backup.groups]
media = ['{root}/srv/media/config', '{root}/srv/media/db']
notes = ['{root}/home/notes']
"#
    ))?;
    Ok(config)
}

#[test]
fn backup_with_tar() -> TestResult {
    let temp = assert_fs::TempDir::new()?;
    let config = backup_config(&temp, "kind = \"tar\"\ncompression = \"gzip\"")?;

    Command::cargo_bin("hk")?
        .arg("--config")
        .arg(config.path())
        .arg("backup")
        .arg("med*")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("backup med*: ok"))
        .stdout(predicate::str::contains("[map_directories] ok"))
        .stdout(predicate::str::contains("[archive] ok"))
        .stdout(predicate::str::contains("archiver = tar"));

    let archives = temp.child("backups/media/config");
    archives.assert(predicate::path::is_dir());
    let written: Vec<_> = std::fs::read_dir(archives.path())?.collect::<Result<_, _>>()?;
    assert_eq!(written.len(), 1);
    let name = written[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("config_") && name.ends_with(".tar.gz"));
    temp.child("backups/media/db").assert(predicate::path::is_dir());
    temp.child("backups/notes").assert(predicate::path::missing());
    Ok(())
}

#[test]
fn backup_twice_adds_suffix() -> TestResult {
    let temp = assert_fs::TempDir::new()?;
    let config = backup_config(&temp, "kind = \"zip\"")?;

    for _ in 0..2 {
        Command::cargo_bin("hk")?
            .args(["backup", "notes", "-c"])
            .arg(config.path())
            .assert()
            .success();
    }

    let mut names: Vec<String> = std::fs::read_dir(temp.child("backups/notes/notes").path())?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    names.sort();
    assert_eq!(names.len(), 2);
    // Both runs may fall in different minutes; only a same-minute clash gets a suffix.
    if names[0].len() != names[1].len() {
        assert!(names[1].ends_with("_01.zip"));
    }
    Ok(())
}

#[test]
fn backup_without_match_fails() -> TestResult {
    let temp = assert_fs::TempDir::new()?;
    let config = backup_config(&temp, "kind = \"tar\"")?;

    Command::cargo_bin("hk")?
        .arg("-c")
        .arg(config.path())
        .args(["backup", "photos"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("nothing matches photos"))
        .stdout(predicate::str::contains("[archive]").not());
    temp.child("backups").assert(predicate::path::missing());
    Ok(())
}

#[test]
fn up_without_stacks_fails() -> TestResult {
    let temp = assert_fs::TempDir::new()?;
    temp.child("stacks/notes/README.md").write_str("not a stack\n")?;
    let config = temp.child("config.toml");
    config.write_str(&format!(
        "[deploy]\ndirectories = ['{}']\n",
        temp.child("stacks").path().display()
    ))?;

    Command::cargo_bin("hk")?
        .arg("--config")
        .arg(config.path())
        .arg("up")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[map_services] FAILED"))
        .stdout(predicate::str::contains("create_services").not());
    Ok(())
}

#[test]
fn missing_config_file() -> TestResult {
    let temp = assert_fs::TempDir::new()?;
    Command::cargo_bin("hk")?
        .arg("--config")
        .arg(temp.child("absent.toml").path())
        .arg("down")
        .assert()
        .code(66)
        .stderr(predicate::str::contains("could not be read"));
    Ok(())
}

#[test]
fn invalid_config_file() -> TestResult {
    let temp = assert_fs::TempDir::new()?;
    let config = temp.child("config.toml");
    config.write_str("[backup]\ndestination = '/b'\narchiver = \"nope\"\n")?;
    Command::cargo_bin("hk")?
        .arg("--config")
        .arg(config.path())
        .arg("backup")
        .assert()
        .code(78)
        .stderr(predicate::str::contains("undefined archiver profile 'nope'"));

    config.write_str("[backup]\ndestinaton = '/b'\n")?;
    Command::cargo_bin("hk")?
        .arg("--config")
        .arg(config.path())
        .arg("backup")
        .assert()
        .code(78)
        .stderr(predicate::str::contains("is invalid"));
    Ok(())
}

#[test]
fn invalid_environment_selector() -> TestResult {
    let temp = assert_fs::TempDir::new()?;
    let config = temp.child("config.toml");
    config.write_str(
        "[deploy]\ndirectories = []\n\n[[deploy.environment]]\nselectors = ['[media']\nvariables = { PUID = \"1000\" }\n",
    )?;
    Command::cargo_bin("hk")?
        .arg("--config")
        .arg(config.path())
        .arg("up")
        .assert()
        .code(78)
        .stderr(predicate::str::contains("invalid selector '[media'"));
    Ok(())
}

#[test]
fn missing_section() -> TestResult {
    let temp = assert_fs::TempDir::new()?;
    let config = temp.child("config.toml");
    config.write_str("[archivers.a]\nkind = \"tar\"\n")?;
    Command::cargo_bin("hk")?
        .arg("--config")
        .arg(config.path())
        .arg("up")
        .assert()
        .code(78)
        .stderr(predicate::str::contains("[deploy] section is not configured"));
    Ok(())
}

#[test]
fn invalid_selector() -> TestResult {
    Command::cargo_bin("hk")?
        .args(["--config", "/nonexistent/config.toml", "backup", "[media"])
        .assert()
        .code(64)
        .stderr(predicate::str::contains("invalid selector '[media'"));
    Ok(())
}
