//! Fake at(1) daemon shared by the integration tests
//!
//! The daemon is a shell script keeping its queue in the directory it is
//! invoked from, so every test gets its own directory holding a symlink to
//! one script written once per test binary (executing a file another thread
//! may still have open for writing fails with ETXTBSY).

#![allow(dead_code)]

use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use atbridge_core::application::AtService;
use atbridge_core::BridgeConfig;
use atbridge_infra_system::SubprocessInvoker;
use tempfile::TempDir;

/// Time printed for relative expressions starting with `now`
pub const FIXED_NOW: &str = "2030-01-02 03:04";

const FAKE_AT: &str = r#"#!/bin/sh
state=$(dirname "$0")
queue="$state/queue"
tab=$(printf '\t')
touch "$queue"

[ -f "$state/hang" ] && sleep 30

case "$(basename "$0")" in
    atrm) set -- -r "$@" ;;
esac

case "$1" in
    -l)
        cat "$queue"
        exit 0
        ;;
    -c)
        if [ -f "$state/script.$2" ]; then
            cat "$state/script.$2"
            exit 0
        fi
        echo "Cannot find jobid $2" >&2
        exit 1
        ;;
    -r)
        shift
        status=1
        for id in "$@"; do
            if grep -q "^$id$tab" "$queue"; then
                grep -v "^$id$tab" "$queue" > "$queue.tmp"
                mv "$queue.tmp" "$queue"
                rm -f "$state/script.$id"
                status=0
            fi
        done
        exit $status
        ;;
esac

if [ -f "$state/fail" ]; then
    echo "syntax error. Last token seen: $1" >&2
    echo "Garbled time" >&2
    exit 1
fi

printf '%s\n' "$@" > "$state/args"
n=$(( $(cat "$state/counter" 2>/dev/null || echo 0) + 1 ))
echo "$n" > "$state/counter"
cat > "$state/script.$n"

case "$1" in
    now*) when="$FIXED_NOW" ;;
    *) when="$1" ;;
esac

echo "warning: commands will be executed using /bin/sh" >&2
[ -f "$state/silent" ] && exit 0
echo "job $n at $when" >&2
printf '%s\t%s a tester\n' "$n" "$when" >> "$queue"
"#;

const RECORDER: &str = r#"#!/bin/sh
printf '%s\0' "$@" > "$(dirname "$0")/argv"
"#;

struct SharedScripts {
    _dir: TempDir,
    fake_at: PathBuf,
    recorder: PathBuf,
}

fn shared_scripts() -> &'static SharedScripts {
    static SCRIPTS: OnceLock<SharedScripts> = OnceLock::new();
    SCRIPTS.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let fake_at = write_executable(
            dir.path(),
            "fake-at",
            &FAKE_AT.replace("$FIXED_NOW", FIXED_NOW),
        );
        let recorder = write_executable(dir.path(), "recorder", RECORDER);
        SharedScripts {
            _dir: dir,
            fake_at,
            recorder,
        }
    })
}

fn write_executable(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// One isolated daemon: its queue, scripts and counters live in `dir`
pub struct FakeAt {
    pub dir: TempDir,
}

impl FakeAt {
    pub fn new() -> Self {
        let scripts = shared_scripts();
        let dir = tempfile::tempdir().unwrap();
        symlink(&scripts.fake_at, dir.path().join("at")).unwrap();
        symlink(&scripts.fake_at, dir.path().join("atrm")).unwrap();
        symlink(&scripts.recorder, dir.path().join("runtime")).unwrap();
        Self { dir }
    }

    pub fn at_program(&self) -> PathBuf {
        self.dir.path().join("at")
    }

    pub fn remove_program(&self) -> PathBuf {
        self.dir.path().join("atrm")
    }

    /// Executable that records its arguments to [`FakeAt::recorded_argv`]
    pub fn runtime(&self) -> PathBuf {
        self.dir.path().join("runtime")
    }

    pub fn config(&self) -> BridgeConfig {
        BridgeConfig::default().with_at_program(self.at_program().to_str().unwrap())
    }

    pub fn service(&self) -> AtService {
        self.service_with(self.config())
    }

    pub fn service_with(&self, config: BridgeConfig) -> AtService {
        let invoker = SubprocessInvoker::new().with_timeout(
            config
                .timeout_ms
                .map(std::time::Duration::from_millis),
        );
        AtService::new(Arc::new(invoker), config)
    }

    /// Switch on a behavior: `fail`, `silent` or `hang`
    pub fn set_mode(&self, mode: &str) {
        std::fs::write(self.dir.path().join(mode), b"").unwrap();
    }

    /// Arguments of the last submission, one per line
    pub fn last_submit_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("args"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Arguments the runtime was last executed with, without argv[0]
    pub fn recorded_argv(&self) -> Vec<Vec<u8>> {
        let raw = std::fs::read(self.dir.path().join("argv")).unwrap();
        let mut words: Vec<Vec<u8>> = raw.split(|&b| b == 0).map(<[u8]>::to_vec).collect();
        // printf terminates every word, leaving an empty tail
        words.pop();
        words
    }
}

/// Run `script` the way the daemon eventually does
pub fn run_with_sh(script: &[u8]) -> std::process::Output {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    std::process::Command::new("sh")
        .arg("-c")
        .arg(OsStr::from_bytes(script))
        .output()
        .unwrap()
}
