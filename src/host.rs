//! Host catalog: supported target triplets and their base environments.
//!
//! Each host carries an ordered environment layer in `pattern:KEY=VALUE`
//! form. The catalog is built once at startup and passed by reference; hosts
//! are never mutated during a build.
//!
//! Darwin targets resolve toolchain paths through `xcrun` at catalog
//! construction. When `xcrun` is unavailable the literal `$(xcrun ...)`
//! command substitution is kept in the value, so steps running under a shell
//! still resolve it.

use std::collections::BTreeMap;

use crate::process;

/// A supported target triplet and its base environment layer.
#[derive(Debug, Clone)]
pub struct Host {
    /// Target platform identifier, e.g. `aarch64-linux-gnu`.
    pub triplet: String,
    /// Ordered base environment layer entries.
    pub env: Vec<String>,
}

/// Registry of supported hosts, keyed by triplet.
#[derive(Debug)]
pub struct HostCatalog {
    hosts: BTreeMap<String, Host>,
}

impl HostCatalog {
    /// Build the catalog of supported hosts.
    pub fn new() -> Self {
        let mut hosts = BTreeMap::new();
        for host in supported_hosts() {
            hosts.insert(host.triplet.clone(), host);
        }
        Self { hosts }
    }

    /// Look up a host by triplet.
    pub fn get(&self, triplet: &str) -> Option<&Host> {
        self.hosts.get(triplet)
    }

    /// All supported triplets, sorted.
    pub fn triplets(&self) -> Vec<&str> {
        self.hosts.keys().map(|s| s.as_str()).collect()
    }

    /// Iterate all hosts in triplet order.
    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }
}

impl Default for HostCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Triplet the building machine itself compiles for. Native tools are built
/// for this triplet regardless of the requested target.
pub fn native_triplet() -> &'static str {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "aarch64") => "aarch64-apple-darwin",
        ("macos", "x86_64") => "x86_64-apple-darwin",
        ("linux", "aarch64") => "aarch64-linux-gnu",
        _ => "x86_64-linux-gnu",
    }
}

/// Global environment layer of the building machine, applied before any
/// host or package layer.
pub fn builder_env() -> Vec<String> {
    let native = native_triplet();
    let mut env = vec![
        format!("all:HOST={native}"),
        format!("all:TARGET={native}"),
    ];
    env.extend(
        [
            "all:CC=clang",
            "all:CXX=clang++",
            "all:AR=ar",
            "all:RANLIB=ranlib",
            "all:STRIP=strip",
            "all:NM=nm",
            "all:OTOOL=otool",
            "all:AUTOMAKE=automake",
            "all:INSTALL_NAME_TOOL=install_name_tool",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    env
}

/// Base PATH of the building machine, appended after the composed PATH when
/// executing build steps.
pub fn base_path() -> &'static str {
    if cfg!(target_os = "macos") {
        "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin"
    } else {
        "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin"
    }
}

/// Resolve a command substitution at catalog build time.
///
/// Falls back to the literal `$(cmd)` form when the command cannot run, so
/// the value stays meaningful inside a shell.
fn shell_output(cmd: &str) -> String {
    match process::shell_capture(cmd) {
        Some(out) if !out.is_empty() => out,
        _ => format!("$({cmd})"),
    }
}

fn linux_gnu_host(arch: &str) -> Host {
    let triplet = format!("{arch}-linux-gnu");
    Host {
        env: vec![
            format!("all:HOST={triplet}"),
            format!("all:TARGET={triplet}"),
            format!("all:CC_target={triplet}"),
            format!("all:CC={triplet}-gcc"),
            format!("all:CXX={triplet}-g++"),
            "all:CFLAGS=".to_string(),
            "all:CXXFLAGS=$CFLAGS".to_string(),
            "all:ARFLAGS=cr".to_string(),
            format!("all:RANLIB={triplet}-ranlib"),
            format!("all:AR={triplet}-ar"),
            format!("all:LIBTOOL={triplet}-libtool"),
        ],
        triplet,
    }
}

fn android_host(triplet: &str, cc_prefix: &str) -> Host {
    Host {
        triplet: triplet.to_string(),
        env: vec![
            format!("all:HOST={triplet}"),
            format!("all:TARGET={triplet}"),
            format!("all:CC_target={triplet}"),
            format!("all:CC={cc_prefix}21-clang"),
            format!("all:CXX={cc_prefix}21-clang++"),
            "all:CFLAGS=".to_string(),
            "all:CXXFLAGS=$CFLAGS".to_string(),
            "all:ARFLAGS=cr".to_string(),
            "all:RANLIB=llvm-ranlib".to_string(),
            "all:AR=llvm-ar".to_string(),
            "all:LIBTOOL=llvm-libtool".to_string(),
            "all:ANDROID_NDK_HOME=$PREFIX/native/".to_string(),
        ],
    }
}

fn apple_host(triplet: &str, sdk: &str, min_version_entry: &str, min_flag: &str) -> Host {
    let clang = shell_output("xcrun -f clang");
    let clangxx = shell_output("xcrun -f clang++");
    let sdk_path = shell_output(&format!("xcrun --sdk {sdk} --show-sdk-path"));
    let cc = format!(
        "{clang} -target $CC_target {min_flag} --sysroot {sdk_path} -I{sdk_path}/usr/include -I$PREFIX/include"
    );
    let cxx = format!(
        "{clangxx} -target $CC_target {min_flag} --sysroot {sdk_path} -I{sdk_path}/usr/include -I$PREFIX/include"
    );
    Host {
        triplet: triplet.to_string(),
        env: vec![
            format!("all:HOST={triplet}"),
            format!("all:TARGET={triplet}"),
            min_version_entry.to_string(),
            "all:LD64_VERSION=609".to_string(),
            format!("all:CC_target={triplet}"),
            format!("all:CC={cc}"),
            format!("all:CXX={cxx}"),
            "all:CFLAGS=".to_string(),
            "all:CXXFLAGS=$CFLAGS -stdlib=libc++".to_string(),
            "all:ARFLAGS=cr".to_string(),
            format!("all:RANLIB={}", shell_output("xcrun -f ranlib")),
            format!("all:AR={}", shell_output("xcrun -f ar")),
            format!("all:LIBTOOL={}", shell_output("xcrun -f libtool")),
            format!("all:SDK_PATH={sdk_path}"),
        ],
    }
}

fn supported_hosts() -> Vec<Host> {
    vec![
        apple_host(
            "aarch64-apple-darwin",
            "macosx",
            "all:OSX_MIN_VERSION=10.15",
            "-mmacosx-version-min=$OSX_MIN_VERSION",
        ),
        apple_host(
            "x86_64-apple-darwin",
            "macosx",
            "all:OSX_MIN_VERSION=10.15",
            "-mmacosx-version-min=$OSX_MIN_VERSION",
        ),
        apple_host(
            "aarch64-apple-ios",
            "iphoneos",
            "all:IOS_MIN_VERSION=12",
            "-mios-version-min=$IOS_MIN_VERSION",
        ),
        linux_gnu_host("x86_64"),
        linux_gnu_host("aarch64"),
        android_host("aarch64-linux-android", "aarch64-linux-android"),
        android_host("x86_64-linux-android", "x86_64-linux-android"),
        android_host("armv7a-linux-androideabi", "armv7a-linux-androideabi"),
    ]
}
