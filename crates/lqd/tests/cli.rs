use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::process::Output;
use std::process::Stdio;

fn lqd(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lqd"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

mod render {
    use super::*;

    #[test]
    fn renders_file_with_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.liquid"), "Hello {{ name | upcase }}!").unwrap();
        std::fs::write(dir.path().join("data.json"), r#"{"name": "ann"}"#).unwrap();

        let output = lqd(dir.path(), &["render", "page.liquid", "--data", "data.json"]);

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(stdout(&output), "Hello ANN!");
    }

    #[test]
    fn reads_template_from_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = Command::new(env!("CARGO_BIN_EXE_lqd"))
            .args(["render"])
            .current_dir(dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        child
            .stdin
            .take()
            .unwrap()
            .write_all(b"{% for i in (1..3) %}{{ i }}{% endfor %}")
            .unwrap();
        let output = child.wait_with_output().unwrap();

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(stdout(&output), "123");
    }

    #[test]
    fn loads_partials_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("partials")).unwrap();
        std::fs::write(dir.path().join("partials/_card.liquid"), "[{{ title }}]").unwrap();
        std::fs::write(
            dir.path().join("page.liquid"),
            "{% render 'card', title: 'Hat' %}",
        )
        .unwrap();

        let output = lqd(dir.path(), &["render", "page.liquid", "--root", "partials"]);

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(stdout(&output), "[Hat]");
    }

    #[test]
    fn template_root_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lqd.toml"),
            "template_root = \"snippets\"\npartial_pattern = \"%s.liquid\"\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("snippets")).unwrap();
        std::fs::write(dir.path().join("snippets/footer.liquid"), "bye").unwrap();
        std::fs::write(dir.path().join("page.liquid"), "{% include 'footer' %}").unwrap();

        let output = lqd(dir.path(), &["render", "page.liquid"]);

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(stdout(&output), "bye");
    }

    #[test]
    fn recovered_errors_are_inline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.liquid"), "a{{ 1 | divided_by: 0 }}b").unwrap();

        let output = lqd(dir.path(), &["render", "page.liquid"]);

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(stdout(&output), "aLiquid error (line 1): divided by 0b");
        assert!(stderr(&output).contains("zero-division"), "{}", stderr(&output));
    }

    #[test]
    fn strict_fails_on_undefined_variables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.liquid"), "{{ missing }}").unwrap();

        let output = lqd(dir.path(), &["render", "--strict", "page.liquid"]);

        assert_eq!(output.status.code(), Some(1));
        assert!(
            stderr(&output).contains("undefined variable missing"),
            "{}",
            stderr(&output)
        );
    }

    #[test]
    fn syntax_error_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.liquid"), "ok\n{% frobnicate %}").unwrap();

        let output = lqd(dir.path(), &["render", "page.liquid"]);

        assert_eq!(output.status.code(), Some(1));
        let stderr = stderr(&output);
        assert!(stderr.contains("error[syntax]"), "{stderr}");
        assert!(stderr.contains("Unknown tag 'frobnicate'"), "{stderr}");
        assert!(stdout(&output).is_empty());
    }

    #[test]
    fn quiet_suppresses_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.liquid"), "{% frobnicate %}").unwrap();

        let output = lqd(dir.path(), &["render", "-q", "page.liquid"]);

        assert_eq!(output.status.code(), Some(1));
        assert!(stderr(&output).is_empty(), "{}", stderr(&output));
    }

    #[test]
    fn data_must_be_an_object() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.liquid"), "x").unwrap();
        std::fs::write(dir.path().join("data.json"), "[1, 2]").unwrap();

        let output = lqd(dir.path(), &["render", "page.liquid", "--data", "data.json"]);

        assert_eq!(output.status.code(), Some(2));
        assert!(
            stderr(&output).contains("must contain a JSON object"),
            "{}",
            stderr(&output)
        );
    }

    #[test]
    fn debug_setting_enables_debug_logs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.liquid"), "hi").unwrap();

        let output = lqd(dir.path(), &["render", "page.liquid"]);
        assert!(!stderr(&output).contains("loaded settings"), "{}", stderr(&output));

        std::fs::write(dir.path().join("lqd.toml"), "debug = true\n").unwrap();
        let output = lqd(dir.path(), &["render", "page.liquid"]);
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(stdout(&output), "hi");
        assert!(stderr(&output).contains("loaded settings"), "{}", stderr(&output));

        let output = lqd(dir.path(), &["render", "-q", "page.liquid"]);
        assert!(stderr(&output).is_empty(), "{}", stderr(&output));
    }
}

mod check {
    use super::*;

    #[test]
    fn clean_templates_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(
            dir.path().join("templates/good.liquid"),
            "{% if user %}Hello {{ user.name }}{% endif %}\n",
        )
        .unwrap();

        let output = lqd(dir.path(), &["check", "templates"]);

        assert!(
            output.status.success(),
            "stdout: {}\nstderr: {}",
            stdout(&output),
            stderr(&output)
        );
    }

    #[test]
    fn broken_template_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("templates/good.liquid"), "{{ x }}").unwrap();
        std::fs::write(
            dir.path().join("templates/broken.liquid"),
            "<p>\n{% if user %}\n</p>\n",
        )
        .unwrap();

        let output = lqd(dir.path(), &["check", "templates"]);

        assert_eq!(output.status.code(), Some(1));
        let stdout = stdout(&output);
        assert!(stdout.contains("error[syntax]"), "{stdout}");
        assert!(stdout.contains("broken.liquid"), "{stdout}");
        assert!(!stdout.contains("good.liquid"), "{stdout}");
        assert!(
            stderr(&output).contains("Found 1 error in 1 file."),
            "{}",
            stderr(&output)
        );
    }

    #[test]
    fn strict_mode_rejects_lax_markup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.liquid"), "{{ 'x' | | upcase }}").unwrap();

        let output = lqd(dir.path(), &["check"]);

        assert_eq!(output.status.code(), Some(1));
    }

    #[test]
    fn counts_every_failing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.liquid"), "{% endif %}").unwrap();
        std::fs::write(dir.path().join("b.liquid"), "{% nope %}").unwrap();

        let output = lqd(dir.path(), &["check", "."]);

        assert_eq!(output.status.code(), Some(1));
        assert!(
            stderr(&output).contains("Found 2 errors in 2 files."),
            "{}",
            stderr(&output)
        );
    }

    #[test]
    fn empty_directory_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();

        let output = lqd(dir.path(), &["check", "templates"]);

        assert!(output.status.success());
    }
}
