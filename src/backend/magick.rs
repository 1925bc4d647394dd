use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::trace;

use super::Backend;
use crate::codec;
use crate::error::BackendError;
use crate::metadata::{Metadata, KEY_HEIGHT, KEY_WIDTH};

/// Executables tried, in order: ImageMagick 7, then the ImageMagick 6 name
const PROGRAMS: [&str; 2] = ["magick", "convert"];

/// Backend driving the ImageMagick command line tools.
///
/// Pixels go through the external program; metadata is written with `-set`
/// (ImageMagick stores image properties as PNG `tEXt` chunks) and read back
/// with the PNG codec.
#[derive(Debug, Clone, Default)]
pub struct MagickBackend {
    program: Option<PathBuf>,
}

impl MagickBackend {
    /// Look for an ImageMagick executable on `PATH`
    pub fn locate() -> Self {
        let program = PROGRAMS
            .iter()
            .find_map(|name| which::which(name).ok());
        Self { program }
    }

    /// Use a specific executable (`None` makes the backend unavailable)
    pub fn with_program(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    fn run<I, S>(&self, args: I) -> Result<Vec<u8>, BackendError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = self.program.as_deref().ok_or(BackendError::Unavailable)?;
        let mut command = Command::new(program);
        command.args(args);
        trace!(?command, "Running ImageMagick");

        let output = command.output()?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(BackendError::Command {
                program: program.display().to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    /// Width and height of the first frame of `source`
    fn dimensions(&self, source: &Path) -> Result<(u32, u32), BackendError> {
        let unreadable = |reason: String| BackendError::Unreadable {
            path: source.to_path_buf(),
            reason,
        };

        let stdout = self
            .run([first_frame(source), "-format".into(), "%w %h".into(), "info:".into()])
            .map_err(|e| match e {
                BackendError::Command { stderr, .. } => unreadable(stderr),
                other => other,
            })?;

        let text = String::from_utf8_lossy(&stdout);
        let mut fields = text.split_whitespace().map(str::parse::<u32>);
        match (fields.next(), fields.next()) {
            (Some(Ok(width)), Some(Ok(height))) => Ok((width, height)),
            _ => Err(unreadable(format!("unexpected geometry {:?}", text.trim()))),
        }
    }
}

impl Backend for MagickBackend {
    fn name(&self) -> &'static str {
        "imagemagick"
    }

    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    fn decode_and_resize(
        &self,
        source: &Path,
        box_size: u32,
        metadata: &Metadata,
        out: &Path,
    ) -> Result<(), BackendError> {
        let (width, height) = self.dimensions(source)?;
        let mut metadata = metadata.clone();
        metadata.insert(KEY_WIDTH, width);
        metadata.insert(KEY_HEIGHT, height);

        // `>` only shrinks
        let mut args = vec![
            first_frame(source),
            "-auto-orient".into(),
            "-thumbnail".into(),
            format!("{box_size}x{box_size}>").into(),
            "-strip".into(),
        ];
        args.extend(set_args(&metadata));
        args.push(png_target(out));

        self.run(args).map(drop)
    }

    fn write_blank(&self, metadata: &Metadata, out: &Path) -> Result<(), BackendError> {
        let mut args: Vec<OsString> = vec!["-size".into(), "1x1".into(), "xc:none".into()];
        args.extend(set_args(metadata));
        args.push(png_target(out));

        self.run(args).map(drop)
    }

    fn read_metadata(&self, path: &Path) -> Result<Metadata, BackendError> {
        codec::read(path)
    }

    fn reattach_metadata(
        &self,
        image: &Path,
        metadata: &Metadata,
        out: &Path,
    ) -> Result<(), BackendError> {
        let mut args = vec![first_frame(image), "-strip".into()];
        args.extend(set_args(metadata));
        args.push(png_target(out));

        self.run(args).map(drop)
    }
}

/// `path[0]`: only the first frame of animations and multi-page files
fn first_frame(path: &Path) -> OsString {
    let mut arg = path.as_os_str().to_owned();
    arg.push("[0]");
    arg
}

/// Force PNG output whatever the file name says
fn png_target(path: &Path) -> OsString {
    let mut arg = OsString::from("png:");
    arg.push(path);
    arg
}

/// `-set key value` for every entry. ImageMagick expands `%` escapes in
/// property values, so literal percent signs are doubled.
fn set_args(metadata: &Metadata) -> Vec<OsString> {
    metadata
        .iter()
        .flat_map(|(key, value)| {
            [
                OsString::from("-set"),
                OsString::from(key),
                OsString::from(value.replace('%', "%%")),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_without_program() {
        let backend = MagickBackend::with_program(None);
        assert!(!backend.is_available());

        let err = backend
            .write_blank(&Metadata::new(), Path::new("/nonexistent/out.png"))
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable));
    }

    #[test]
    fn test_argument_helpers() {
        assert_eq!(first_frame(Path::new("/tmp/a b.gif")), OsString::from("/tmp/a b.gif[0]"));
        assert_eq!(png_target(Path::new("/tmp/x.tmp")), OsString::from("png:/tmp/x.tmp"));

        let metadata: Metadata = [("Thumb::URI", "http://x/y.pdf"), ("Thumb::MTime", "0")]
            .into_iter()
            .collect();
        assert_eq!(
            set_args(&metadata),
            ["-set", "Thumb::URI", "http://x/y.pdf", "-set", "Thumb::MTime", "0"]
                .map(OsString::from)
                .to_vec()
        );

        let encoded: Metadata = [("Thumb::URI", "file:///tmp/caf%C3%A9%20x.jpg")]
            .into_iter()
            .collect();
        assert_eq!(
            set_args(&encoded)[2],
            OsString::from("file:///tmp/caf%%C3%%A9%%20x.jpg")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_reports_unreadable_source() {
        // `false` exits non-zero for any arguments, like a failed decode
        let backend = MagickBackend::with_program(which::which("false").ok());
        if !backend.is_available() {
            return;
        }

        let err = backend
            .decode_and_resize(
                Path::new("/tmp/missing.jpg"),
                128,
                &Metadata::new(),
                Path::new("/tmp/out.png"),
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Unreadable { .. }), "{err:?}");
    }
}
