use hostkeeper::application::Application;
use hostkeeper::backup::{self, Archived};
use hostkeeper::commands::{self, Commands};
use hostkeeper::pipeline::{Action, Command, Entries, Pipeline};
use hostkeeper::selector::Selectors;
use std::fs::{self, File};
use std::path::Path;
use std::rc::Rc;
use tempfile::tempdir;

fn write_tree(root: &Path) {
    fs::create_dir_all(root.join("photos/2024")).unwrap();
    fs::write(root.join("photos/2024/cat.txt"), "meow").unwrap();
    fs::write(root.join("photos/index.txt"), "one photo").unwrap();
}

#[test]
fn test_zip_backup_contents() {
    let temp = tempdir().unwrap();
    write_tree(temp.path());
    let config = temp.path().join("config.toml");
    fs::write(
        &config,
        format!(
            "[archivers.z]\nkind = \"zip\"\n\n[backup]\ndestination = '{root}/out'\narchiver = \"z\"\n\n[backup.groups]\npictures = ['{root}/photos']\n",
            root = temp.path().display()
        ),
    )
    .unwrap();

    let result = commands::run(&Commands::Backup { selectors: vec![] }, &config).unwrap();
    assert!(result.success());
    let archived = result.action::<Archived>(1).unwrap();
    let status = &archived.entries.entries[0].status;
    assert!(status.size() > 0);
    assert!(status.archive.starts_with(temp.path().join("out/pictures/photos")));

    let mut zip = zip::ZipArchive::new(File::open(&status.archive).unwrap()).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    assert!(names.contains(&"photos/index.txt".to_string()));
    assert!(names.contains(&"photos/2024/cat.txt".to_string()));
    let mut cat = String::new();
    std::io::Read::read_to_string(&mut zip.by_name("photos/2024/cat.txt").unwrap(), &mut cat)
        .unwrap();
    assert_eq!(cat, "meow");
}

#[test]
fn test_backup_command_from_config() {
    let temp = tempdir().unwrap();
    write_tree(temp.path());
    let app: Application = toml::from_str(&format!(
        "[archivers.t]\nkind = \"tar\"\ncompression = \"xz\"\n[backup]\ndestination = '{root}/out'\narchiver = \"t\"\n[backup.groups]\npictures = ['{root}/photos']\nmissing = ['{root}/nowhere']\n",
        root = temp.path().display()
    ))
    .unwrap();
    app.validate().unwrap();
    let archiver = app
        .archiver("t", Rc::new(hostkeeper::process::SystemRunner))
        .unwrap();
    let command = backup::command(
        temp.path().join("out"),
        app.backup_groups().unwrap(),
        archiver,
        None,
    );

    // Only the missing directory is selected, so the archive stage fails.
    let result = command.execute(&Selectors::new(&["miss*"]).unwrap());
    assert!(!result.success());
    assert_eq!(result.actions.len(), 2);

    let result = command.execute(&Selectors::all());
    assert!(result.success());
    let archived = result.action::<Archived>(1).unwrap();
    assert_eq!(archived.entries.entries.len(), 2);
    assert!(archived.entries.entries[1].status.archive.to_string_lossy().ends_with(".tar.xz"));
}

#[derive(Debug)]
struct Lengths(Vec<usize>);

impl Entries for Lengths {
    fn success(&self) -> bool {
        self.0.iter().all(|len| *len > 0)
    }

    fn lines(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

struct Measure;

impl Action for Measure {
    type Input = Vec<String>;
    type Output = Lengths;

    fn name(&self) -> &str {
        "measure"
    }

    fn run(&self, input: &Vec<String>) -> Lengths {
        Lengths(input.iter().map(String::len).collect())
    }
}

struct Double;

impl Action for Double {
    type Input = Lengths;
    type Output = Lengths;

    fn name(&self) -> &str {
        "double"
    }

    fn run(&self, input: &Lengths) -> Lengths {
        Lengths(input.0.iter().map(|len| len * 2).collect())
    }
}

#[test]
fn test_custom_actions_compose() {
    let command = Command::new("lengths", Pipeline::start(Measure).then(Double));
    let result = command.execute(&vec!["ab".to_string(), "cde".to_string()]);
    assert!(result.success());
    assert_eq!(result.action::<Lengths>(1).unwrap().entries.0, [4, 6]);

    let result = command.execute(&vec!["ab".to_string(), String::new()]);
    assert!(!result.success());
    assert_eq!(result.actions.len(), 1);
    assert_eq!(result.actions[0].lines(), ["2", "0"]);
}
