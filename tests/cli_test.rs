use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

// Write some text with enough repetition to compress well, with a few variations
// so that it is not trivial.
fn write_sample(temp_dir: &tempfile::TempDir,name: &str) -> Result<(PathBuf,Vec<u8>),Box<dyn std::error::Error>> {
    let mut txt: Vec<u8> = Vec::new();
    for i in 0..2000 {
        txt.extend_from_slice(format!("Scene {}. Enter HAMLET, HORATIO, and MARCELLUS.\r\n",i % 37).as_bytes());
        txt.extend_from_slice(b"HAMLET: The air bites shrewdly; it is very cold.\r\n");
        txt.extend_from_slice(format!("HORATIO: It is a nipping and an eager air, {} times over.\r\n",i * 7919 % 1000).as_bytes());
    }
    let path = temp_dir.path().join(name);
    std::fs::write(&path,&txt)?;
    Ok((path,txt))
}

fn compress_file(in_path: &PathBuf,out_path: &PathBuf,level: &str) -> STDRESULT {
    let mut cmd = Command::cargo_bin("rolzpack")?;
    cmd.arg("compress")
        .arg("-l").arg(level)
        .arg("-i").arg(in_path)
        .arg("-o").arg(out_path)
        .arg("-f")
        .assert()
        .success()
        .stderr(predicate::str::starts_with("compressed"));
    Ok(())
}

fn expand_file(in_path: &PathBuf,out_path: &PathBuf) -> STDRESULT {
    let mut cmd = Command::cargo_bin("rolzpack")?;
    cmd.arg("expand")
        .arg("-i").arg(in_path)
        .arg("-o").arg(out_path)
        .arg("-f")
        .assert()
        .success()
        .stderr(predicate::str::starts_with("expanded"));
    Ok(())
}

#[test]
fn file_round_trip() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let (xpath,txt) = write_sample(&temp_dir,"scene.txt")?;
    let cpath = temp_dir.path().join("scene.rolz");
    let rpath = temp_dir.path().join("scene_restored.txt");
    compress_file(&xpath,&cpath,"2")?;
    let compressed = std::fs::read(&cpath)?;
    assert!(compressed.len() * 4 < txt.len());
    expand_file(&cpath,&rpath)?;
    assert_eq!(std::fs::read(&rpath)?,txt);
    Ok(())
}

#[test]
fn every_level_round_trips() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let (xpath,txt) = write_sample(&temp_dir,"scene.txt")?;
    let cpath = temp_dir.path().join("scene.rolz");
    let rpath = temp_dir.path().join("scene_restored.txt");
    for level in ["0","1","2","3","4"] {
        compress_file(&xpath,&cpath,level)?;
        expand_file(&cpath,&rpath)?;
        assert_eq!(std::fs::read(&rpath)?,txt);
    }
    Ok(())
}

#[test]
fn existing_output_is_replaced() -> STDRESULT {
    // the output starts out longer than what will be written
    let temp_dir = tempfile::tempdir()?;
    let (xpath,txt) = write_sample(&temp_dir,"scene.txt")?;
    let cpath = temp_dir.path().join("scene.rolz");
    let rpath = temp_dir.path().join("scene_restored.txt");
    std::fs::write(&cpath,vec![0xaa;txt.len()])?;
    std::fs::write(&rpath,vec![0xaa;txt.len() * 2])?;
    compress_file(&xpath,&cpath,"2")?;
    assert!(std::fs::read(&cpath)?.len() < txt.len());
    expand_file(&cpath,&rpath)?;
    assert_eq!(std::fs::read(&rpath)?,txt);
    Ok(())
}

#[test]
fn standard_streams() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let (_xpath,txt) = write_sample(&temp_dir,"scene.txt")?;
    let compressed = assert_cmd::Command::cargo_bin("rolzpack")?
        .arg("compress")
        .arg("-q")
        .write_stdin(txt.clone())
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .get_output()
        .stdout
        .clone();
    assert!(compressed.len() < txt.len());
    assert_cmd::Command::cargo_bin("rolzpack")?
        .arg("expand")
        .arg("-q")
        .write_stdin(compressed)
        .assert()
        .success()
        .stdout(txt);
    Ok(())
}

#[test]
fn empty_input() -> STDRESULT {
    assert_cmd::Command::cargo_bin("rolzpack")?
        .arg("compress")
        .arg("-q")
        .write_stdin(Vec::<u8>::new())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert_cmd::Command::cargo_bin("rolzpack")?
        .arg("expand")
        .arg("-q")
        .write_stdin(Vec::<u8>::new())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    Ok(())
}

#[test]
fn corrupt_input_fails() -> STDRESULT {
    assert_cmd::Command::cargo_bin("rolzpack")?
        .arg("expand")
        .arg("-q")
        .write_stdin(vec![7u8,0,0,0,1])
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvalidFlag(7)"));
    assert_cmd::Command::cargo_bin("rolzpack")?
        .arg("expand")
        .arg("-q")
        .write_stdin(vec![1u8,0,0])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Truncated"));
    Ok(())
}

#[test]
fn bad_level_is_rejected() -> STDRESULT {
    assert_cmd::Command::cargo_bin("rolzpack")?
        .arg("compress")
        .arg("-l").arg("5")
        .write_stdin(b"abc".to_vec())
        .assert()
        .failure();
    Ok(())
}

#[test]
fn overwrite_prompt() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let (xpath,txt) = write_sample(&temp_dir,"scene.txt")?;
    let cpath = temp_dir.path().join("scene.rolz");
    let rpath = temp_dir.path().join("scene_restored.txt");
    let old = vec![0xaa;100];
    std::fs::write(&cpath,&old)?;
    // refusing leaves the file alone
    assert_cmd::Command::cargo_bin("rolzpack")?
        .arg("compress")
        .arg("-i").arg(&xpath)
        .arg("-o").arg(&cpath)
        .write_stdin("n\n")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stderr(predicate::str::contains("overwrite?").and(predicate::str::contains("abort operation")));
    assert_eq!(std::fs::read(&cpath)?,old);
    // accepting replaces it
    assert_cmd::Command::cargo_bin("rolzpack")?
        .arg("compress")
        .arg("-i").arg(&xpath)
        .arg("-o").arg(&cpath)
        .write_stdin("y\n")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stderr(predicate::str::contains("overwrite?").and(predicate::str::contains("compressed")));
    expand_file(&cpath,&rpath)?;
    assert_eq!(std::fs::read(&rpath)?,txt);
    Ok(())
}
