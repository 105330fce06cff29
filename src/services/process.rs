//! Child process execution with output streamed into the log.

use camino::Utf8Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Windows `CREATE_NO_WINDOW` process creation flag
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Run `program` to completion, logging each line of its stdout and stderr at debug level.
///
/// # Returns
/// The process exit code, or -1 when the process was terminated by a signal
///
/// # Errors
/// Returns an error if the process cannot be spawned or waited on
pub async fn run_process(program: &Utf8Path, args: &[String]) -> std::io::Result<i32> {
    tracing::debug!("> {} {}", program, args.join(" "));

    let start = Instant::now();

    let mut cmd = Command::new(program.as_std_path());
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Suppress the console window a console-subsystem exe would otherwise open
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    let mut child = cmd.spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (status, _, _) = tokio::join!(
        child.wait(),
        forward_lines(stdout, "stdout"),
        forward_lines(stderr, "stderr")
    );
    let status = status?;

    let exit_code = status.code().unwrap_or(-1);
    if exit_code != 0 {
        tracing::warn!("{} exited with code {}", program, exit_code);
    }

    tracing::debug!(
        "{} completed in {:.2}s with exit code {}",
        program,
        start.elapsed().as_secs_f32(),
        exit_code
    );

    Ok(exit_code)
}

async fn forward_lines<R>(stream: Option<R>, label: &'static str)
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };

    // Console output may use a non-UTF-8 code page; read to EOF regardless
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                tracing::debug!(stream = label, "{}", line.trim_end());
            }
            Err(e) => {
                tracing::warn!("Failed to read child {}: {}", label, e);
                break;
            }
        }
    }
}
