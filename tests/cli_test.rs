//! CLI 启动校验的集成测试（子进程黑盒）

use std::process::Command;

fn tsup() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tsup"))
}

#[test]
fn test_run_missing_required_args_exits_one() {
    // Given/When: run 缺少必需的 --path 和 --session
    let output = tsup().args(["run", "--name", "proj"]).output().unwrap();

    // Then: 以 1 退出（而不是解析器默认的 2），并打印用法
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "no usage in stderr: {}", stderr);
}

#[test]
fn test_run_nonexistent_root_exits_one() {
    // Given/When: 参数齐全但根目录不存在
    let output = tsup()
        .args([
            "run",
            "--name", "proj",
            "--path", "/nonexistent/tsup-test-root",
            "--session", "proj-sess",
        ])
        .output()
        .unwrap();

    // Then: 启动校验失败，以 1 退出并打印用法
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {}", stderr);
    assert!(stderr.contains("Usage"), "stderr: {}", stderr);
}

#[test]
fn test_help_exits_zero() {
    // Given/When: --help
    let output = tsup().arg("--help").output().unwrap();

    // Then: 正常退出
    assert_eq!(output.status.code(), Some(0));
}
