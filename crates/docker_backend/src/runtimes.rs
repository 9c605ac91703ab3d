//! The registered function runtimes. Each runtime ships a Dockerfile and the
//! HTTP server shim that wraps the uploaded `fn/` tree; both are staged into
//! the runtime cache directory at backend startup and referenced from image
//! builds via the `RUNTIME_DIR` build argument.

use std::{
    collections::BTreeMap,
    sync::LazyLock,
};

pub struct Runtime {
    pub dockerfile: &'static str,
    pub server: &'static str,
}

pub static REGISTRY: LazyLock<BTreeMap<&'static str, Runtime>> = LazyLock::new(|| {
    let mut runtimes = BTreeMap::new();
    runtimes.insert(
        "python3",
        Runtime {
            dockerfile: include_str!("../runtimes/python3/Dockerfile"),
            server: include_str!("../runtimes/python3/server.py"),
        },
    );
    runtimes.insert(
        "ml",
        Runtime {
            dockerfile: include_str!("../runtimes/ml/Dockerfile"),
            server: include_str!("../runtimes/ml/server.py"),
        },
    );
    runtimes.insert(
        "tflite",
        Runtime {
            dockerfile: include_str!("../runtimes/tflite/Dockerfile"),
            server: include_str!("../runtimes/tflite/server.py"),
        },
    );
    runtimes
});

#[cfg(test)]
mod tests {
    use super::REGISTRY;

    #[test]
    fn test_registered_runtimes() {
        let names: Vec<&str> = REGISTRY.keys().copied().collect();
        assert_eq!(names, vec!["ml", "python3", "tflite"]);
        for runtime in REGISTRY.values() {
            assert!(runtime.dockerfile.contains("EXPOSE 8000"));
            assert!(runtime.server.contains("/health"));
            assert!(runtime.server.contains("/fn"));
        }
    }
}
