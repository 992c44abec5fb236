use std::process::Command;

const SYSTEM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<System>
  <Settings>
    <Card type="0x10" device-detect="false"/>
  </Settings>
</System>
"#;

fn mcm() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mcm"))
}

#[test]
fn compile_prints_frames_as_json() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("system.xml");
    std::fs::write(&path, SYSTEM)?;

    let out = mcm().arg("compile").arg(&path).arg("--json").output()?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let frames: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    let frames = frames
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("expected a list of frames"))?;
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|f| f["stage"] == "cards"));
    Ok(())
}

#[test]
fn provision_over_mock_reports_counts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("system.xml");
    std::fs::write(&path, SYSTEM)?;

    let out = mcm().arg("provision").arg(&path).arg("--metrics").output()?;
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = String::from_utf8(out.stdout)?;
    assert!(text.contains("cards: 1 entities"));
    assert!(text.contains("mcm_frames_sent"));
    Ok(())
}

#[test]
fn missing_system_file_fails() -> anyhow::Result<()> {
    let out = mcm().args(["compile", "does-not-exist.xml"]).output()?;
    assert!(!out.status.success());
    Ok(())
}

#[test]
fn one_wire_slots_start_at_one() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("image.bin");
    std::fs::write(&image, [1u8, 2, 3])?;
    let out = mcm()
        .args(["program-one-wire", "--slot", "0", "--image"])
        .arg(&image)
        .output()?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("numbered from 1"));
    Ok(())
}
