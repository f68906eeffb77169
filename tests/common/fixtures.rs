//! Test fixtures - sample recipes for testing.

#![allow(dead_code)]

use formula::StaticProbe;

/// Python bindings for Magnum, built from git head with CMake.
pub const MAGNUM_BINDINGS: &str = r#"
; Bindings for the Magnum engine, built from git head.
(formula "magnum-bindings"
  (description "Bindings for the Magnum C++11/C++14 graphics engine")
  (homepage "https://magnum.graphics")
  (source head "git://github.com/mosra/magnum-bindings.git")
  (depends-on "cmake")
  (depends-on "python")
  (depends-on "magnum")
  (depends-on "pybind11" build)
  (configure cmake (build-type release) (with python))
  (install
    (mkdir "build")
    (cd "build"
      (run "cmake" "$@CONFIGURE_ARGS" "..")
      (run "cmake" "--build" ".")
      (run "cmake" "--build" "." "--target" "install")
      (cd "src/python"
        (delegate-install python)))))
"#;

/// Archive source with a sha256 and versioned dependencies.
pub const VERIFIED_ARCHIVE: &str = r#"
(formula "zlib"
  (version "1.3")
  (description "General-purpose lossless data-compression library")
  (homepage "https://zlib.net")
  (source archive "https://zlib.net/zlib-1.3.tar.gz"
    (sha256 "ff0ba4c292013dbc27530b3a81e1f9a813cd39de01ca5e0f8bf355702efa593e"))
  (depends-on "make" build (version ">=4"))
  (install
    (run "./configure" "--prefix=$PREFIX")
    (run "make" "-j$NPROC")
    (run "make" "install")))
"#;

/// Archive without a checksum; only accepted under the warn policy.
pub const UNCHECKED_ARCHIVE: &str = r#"
(formula "hello"
  (description "Prints a greeting")
  (homepage "https://www.gnu.org/software/hello/")
  (source archive "https://ftp.gnu.org/gnu/hello/hello-2.12.tar.gz")
  (install (run "make" "install")))
"#;

/// Probe where everything magnum-bindings needs is installed.
pub fn magnum_host() -> StaticProbe {
    StaticProbe::new()
        .with("cmake", Some("3.28.1"))
        .with("python", Some("3.12.1"))
        .with("magnum", None)
        .with("pybind11", Some("2.11.1"))
}
