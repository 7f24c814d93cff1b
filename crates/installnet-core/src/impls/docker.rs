//! DockerCli - `docker` CLI 経由の ContainerRuntime

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::RuntimeError;
use crate::impls::stderr_tail;
use crate::ports::{ContainerId, ContainerRuntime, RunSpec};

pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `docker <args>`; stdout and stderr on success.
    async fn docker(&self, args: &[String]) -> Result<(String, String), RuntimeError> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::Failed {
                command: format!("{} {}", self.program, args.first().map(String::as_str).unwrap_or("")),
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok((
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}

fn build_args(context: &Path, dockerfile: &Path, tag: &str) -> Vec<String> {
    vec![
        "build".into(),
        "-f".into(),
        dockerfile.display().to_string(),
        "-t".into(),
        tag.into(),
        context.display().to_string(),
    ]
}

fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args: Vec<String> = vec!["run".into(), "-d".into()];
    args.push(format!("--network={}", spec.network));
    for cap in &spec.cap_add {
        args.push("--cap-add".into());
        args.push(cap.clone());
    }
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{key}={value}"));
    }
    for mount in &spec.mounts {
        let mut volume = format!("{}:{}", mount.host.display(), mount.container);
        if mount.read_only {
            volume.push_str(":ro");
        }
        args.push("-v".into());
        args.push(volume);
    }
    args.push(spec.image.clone());
    args
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build_image(
        &self,
        context: &Path,
        dockerfile: &Path,
        tag: &str,
    ) -> Result<Vec<String>, RuntimeError> {
        let (stdout, stderr) = self.docker(&build_args(context, dockerfile, tag)).await?;
        // BuildKit は進捗を stderr に出す
        Ok(stdout
            .lines()
            .chain(stderr.lines())
            .map(str::to_string)
            .collect())
    }

    async fn run_detached(&self, spec: &RunSpec) -> Result<ContainerId, RuntimeError> {
        let (stdout, _) = self.docker(&run_args(spec)).await?;
        let id = stdout.trim();
        if id.is_empty() {
            return Err(RuntimeError::Malformed("docker run printed no container id".into()));
        }
        Ok(ContainerId::new(id))
    }

    async fn wait(&self, id: &ContainerId) -> Result<i64, RuntimeError> {
        let (stdout, _) = self.docker(&["wait".into(), id.to_string()]).await?;
        stdout
            .trim()
            .parse()
            .map_err(|_| RuntimeError::Malformed(format!("docker wait printed {:?}", stdout.trim())))
    }

    async fn logs(&self, id: &ContainerId) -> Result<String, RuntimeError> {
        let (stdout, stderr) = self.docker(&["logs".into(), id.to_string()]).await?;
        if stderr.is_empty() {
            Ok(stdout)
        } else {
            Ok(format!("{stdout}{stderr}"))
        }
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.docker(&["rm".into(), "-f".into(), id.to_string()])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Mount;

    #[test]
    fn run_args_mount_cache_read_only() {
        let spec = RunSpec {
            image: "installnet-sandbox".into(),
            mounts: vec![
                Mount::read_only(Path::new("/cache/six"), "/app/cache"),
                Mount::writable(Path::new("/tmp/out"), "/app/out"),
            ],
            network: "bridge".into(),
            cap_add: vec!["NET_RAW".into()],
            env: vec![("INSTALLNET_INSTALL_TIMEOUT_SECS".into(), "600".into())],
        };

        let args = run_args(&spec);

        assert_eq!(&args[..3], ["run", "-d", "--network=bridge"]);
        assert!(args.windows(2).any(|w| w == ["--cap-add", "NET_RAW"]));
        assert!(args.windows(2).any(|w| w == ["-v", "/cache/six:/app/cache:ro"]));
        assert!(args.windows(2).any(|w| w == ["-v", "/tmp/out:/app/out"]));
        assert!(args.windows(2).any(|w| w == ["-e", "INSTALLNET_INSTALL_TIMEOUT_SECS=600"]));
        assert_eq!(args.last().map(String::as_str), Some("installnet-sandbox"));
    }

    #[test]
    fn build_args_put_context_last() {
        let args = build_args(Path::new("."), Path::new("sandbox/Dockerfile"), "installnet-sandbox");
        assert_eq!(
            args,
            ["build", "-f", "sandbox/Dockerfile", "-t", "installnet-sandbox", "."]
        );
    }

    #[tokio::test]
    async fn missing_docker_is_a_spawn_error() {
        let docker = DockerCli::new("installnet-no-such-docker");
        let err = docker.wait(&ContainerId::new("abc")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }));
    }
}
