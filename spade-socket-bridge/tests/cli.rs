//! End-to-end tests driving the built binary over standard input.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn plain_passthrough_drops_eoe_and_adds_no_annotation() {
    let input = concat!(
        "type=SYSCALL msg=audit(1:100): syscall=59 success=yes exit=0 a0=0 a1=0 pid=1 comm=\"bash\"\n",
        "type=EXECVE msg=audit(1:100): argc=1 a0=\"ls\"\n",
        "type=PATH msg=audit(1:100): item=0 name=\"/bin/ls\"\n",
        "type=EOE msg=audit(1:100):\n",
    );

    Command::cargo_bin("spadeSocketBridge")
        .unwrap()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("type=SYSCALL")
                .and(predicate::str::contains("unitid=").not()),
        )
        .stdout(predicate::str::contains("type=EOE").not());
}

#[test]
fn unit_open_close_emits_unit_line_and_consumes_marker() {
    let input = concat!(
        "type=SYSCALL msg=audit(1:200): syscall=62 success=no exit=-3 a0=ffffff9c a1=0 pid=1000\n",
        "type=SYSCALL msg=audit(1:201): syscall=2 success=yes exit=3 a0=0 a1=0 pid=1000\n",
        "type=SYSCALL msg=audit(1:202): syscall=62 success=no exit=-3 a0=ffffff9c a1=0 pid=1000\n",
    );

    let assert = Command::cargo_bin("spadeSocketBridge")
        .unwrap()
        .arg("-u")
        .write_stdin(input)
        .assert()
        .success();

    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(output.contains("unitid=0"));
    assert!(output.contains("type=UNIT list=\"\" tid=1000"));
    assert!(!output.contains("a0=ffffff9c"));
}

#[test]
fn out_of_order_ids_are_released_in_ascending_order() {
    let input = concat!(
        "type=SYSCALL msg=audit(1:10): syscall=1 success=yes exit=0 a0=0 a1=0 pid=1\n",
        "type=SYSCALL msg=audit(1:12): syscall=1 success=yes exit=0 a0=0 a1=0 pid=1\n",
        "type=SYSCALL msg=audit(1:11): syscall=1 success=yes exit=0 a0=0 a1=0 pid=1\n",
    );

    let assert = Command::cargo_bin("spadeSocketBridge")
        .unwrap()
        .write_stdin(input)
        .assert()
        .success();

    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains(":10)"));
    assert!(lines[1].contains(":11)"));
    assert!(lines[2].contains(":12)"));
}

#[test]
fn help_flag_exits_successfully() {
    Command::cargo_bin("spadeSocketBridge")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--socket"));
}

#[test]
fn unrecognized_option_exits_with_an_error() {
    Command::cargo_bin("spadeSocketBridge")
        .unwrap()
        .arg("--not-a-real-flag")
        .write_stdin("")
        .assert()
        .failure();
}

mod signal_drain {
    use std::io::Write;
    use std::process::Stdio;
    use std::time::Duration;

    use assert_cmd::cargo::cargo_bin;

    #[test]
    fn sigterm_drains_the_buffer_before_exit() {
        let mut child = std::process::Command::new(cargo_bin("spadeSocketBridge"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("failed to spawn spadeSocketBridge");

        {
            let stdin = child.stdin.as_mut().expect("child stdin was not piped");
            for id in 50..=60u32 {
                let line = format!(
                    "type=SYSCALL msg=audit(1:{id}): syscall=1 success=yes exit=0 a0=0 a1=0 pid=1\n"
                );
                stdin.write_all(line.as_bytes()).unwrap();
            }
            stdin.flush().unwrap();
        }

        // Give the process time to read and buffer the lines; 11 records is
        // well under the default 10_000-record window, so nothing releases
        // on its own until the signal arrives.
        std::thread::sleep(Duration::from_millis(200));

        // SAFETY: libc::kill on our own freshly spawned child pid with a
        // fixed, non-reused signal number.
        unsafe {
            libc::kill(child.id() as i32, libc::SIGTERM);
        }

        let output = child.wait_with_output().expect("child did not exit");
        assert!(output.status.success());

        let stdout = String::from_utf8(output.stdout).unwrap();
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines.len(), 11);
        for (offset, line) in lines.iter().enumerate() {
            let expected_id = format!(":{}", 50 + offset);
            assert!(line.contains(&expected_id), "line {offset}: {line}");
        }
    }
}
