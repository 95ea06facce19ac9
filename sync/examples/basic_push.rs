//! Basic push example demonstrating the pushsync library

use std::error::Error;

use pushsync::{
    CommitOptions, CommitOutcome, DeltaEntry, ProgressChannel, ProgressEvent, ProjectConfig,
    RepoPath, StatusFilter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    println!("Basic Push Example");
    println!("==================");

    let temp_dir = tempfile::TempDir::new()?;
    let local = temp_dir.path().join("project");
    let remote = temp_dir.path().join("remote");

    tokio::fs::create_dir_all(local.join("scenes")).await?;
    tokio::fs::create_dir_all(&remote).await?;
    tokio::fs::write(local.join("main.gd"), b"extends Node").await?;
    tokio::fs::write(local.join("scenes").join("level.tscn"), b"[gd_scene]").await?;
    tokio::fs::write(local.join("debug.log"), b"not pushed").await?;

    let config = ProjectConfig::new(&remote, "*.log\n");
    config.save(&local)?;

    println!("Project directory: {}", local.display());
    println!("Remote directory: {}", remote.display());
    println!();

    // Example 1: the first commit pushes everything
    println!("Example 1: Initial Push");
    println!("-----------------------");

    let engine = pushsync::open_engine(&local, &config, CommitOptions::new("demo"))?;
    let result = engine.commit(&mut StatusFilter::all())?;
    if let CommitOutcome::Initial { pushed } = &result.outcome {
        for path in pushed {
            println!("  pushed {}", path);
        }
    }
    println!("{}", result.metrics.summary());
    println!();

    // Example 2: status after local edits
    println!("Example 2: Status");
    println!("-----------------");

    tokio::fs::write(local.join("main.gd"), b"extends Node2D").await?;
    tokio::fs::remove_file(local.join("scenes").join("level.tscn")).await?;
    tokio::fs::write(local.join("icon.svg"), b"<svg/>").await?;

    let delta = engine.status()?;
    for entry in delta.iter() {
        println!("  {}", entry);
    }
    println!();

    // Example 3: a selective commit with progress reporting
    println!("Example 3: Selective Push with Progress");
    println!("---------------------------------------");

    let (reporter, mut channel) = ProgressChannel::new();
    let engine = engine.with_progress(reporter);
    let task = tokio::task::spawn_blocking(move || {
        let mut uploads_only = |delta: &pushsync::Delta| -> pushsync::Result<Vec<DeltaEntry>> {
            Ok(delta.iter().filter(|e| e.is_upload()).cloned().collect())
        };
        engine.commit(&mut uploads_only)
    });

    while let Some(event) = channel.recv().await {
        match event {
            ProgressEvent::Uploaded { path, bytes, .. } => {
                println!("  uploaded {} ({} bytes)", path, bytes)
            }
            ProgressEvent::Removed { path } => println!("  removed {}", path),
            ProgressEvent::CommitCompleted { duration, .. } => {
                println!("Commit completed in {:.2}s", duration.as_secs_f64());
            }
            _ => {}
        }
    }
    let result = task.await??;
    println!("{}", result.metrics.summary());
    println!();

    // Example 4: read content back from the remote
    println!("Example 4: Download");
    println!("-------------------");

    let mut content = Vec::new();
    let record = pushsync::connect(&config)?.download(&RepoPath::new("main.gd"), &mut content)?;
    println!(
        "  main.gd = {:?} (last edited by {} at {})",
        String::from_utf8_lossy(&content),
        record.last_editor,
        record.last_edit
    );

    println!();
    println!("All examples completed successfully!");

    Ok(())
}
