//! 编译期扫描 migrations/ 目录，取最大的 V{n}__*.sql 版本号，
//! 作为 PRODSYNC_DB_VERSION 注入（见 src/version.rs）。

use std::fs;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=migrations");

    let mut max_version: u64 = 0;
    if let Ok(entries) = fs::read_dir(Path::new("migrations")) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix('V') {
                if let Some((version, _)) = rest.split_once("__") {
                    if let Ok(v) = version.parse::<u64>() {
                        if v > max_version {
                            max_version = v;
                        }
                    }
                }
            }
        }
    }

    println!("cargo:rustc-env=PRODSYNC_DB_VERSION={}", max_version);
}
