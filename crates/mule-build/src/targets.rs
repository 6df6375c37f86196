//! Output file naming for linked targets and object files
use crate::fingerprint::Fingerprint;
use mule_package::TargetKind;

/// Platform naming conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputNaming {
    /// `libname.a`, `libname.so`, `name`, `<fp>.o`
    Unix,
    /// `libname.a`, `libname.dylib`, `name`, `<fp>.o`
    Darwin,
    /// `name.lib`, `name.dll`, `name.exe`, `<fp>.obj`
    Windows,
}

impl OutputNaming {
    /// Conventions of the platform mule was built for
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Unix
        }
    }

    /// Get the output file name for a target
    pub fn output_file_name(&self, kind: TargetKind, name: &str) -> String {
        match (self, kind) {
            (Self::Windows, TargetKind::Binary) => format!("{}.exe", name),
            (Self::Windows, TargetKind::StaticLib) => format!("{}.lib", name),
            (Self::Windows, TargetKind::SharedLib) => format!("{}.dll", name),
            (_, TargetKind::Binary) => name.to_string(),
            (_, TargetKind::StaticLib) => format!("lib{}.a", name),
            (Self::Darwin, TargetKind::SharedLib) => format!("lib{}.dylib", name),
            (_, TargetKind::SharedLib) => format!("lib{}.so", name),
        }
    }

    /// Object files are named after the compile task's fingerprint
    pub fn object_file_name(&self, fingerprint: &Fingerprint) -> String {
        match self {
            Self::Windows => format!("{}.obj", fingerprint.to_hex()),
            Self::Unix | Self::Darwin => format!("{}.o", fingerprint.to_hex()),
        }
    }
}

impl Default for OutputNaming {
    fn default() -> Self {
        Self::host()
    }
}
