//! Names and defaults shared across the crate.

/// Application name, used for config and data directories.
pub const APP_NAME: &str = "buildlens";

/// Project descriptor file expected at the project root.
pub const PROJECT_DESCRIPTOR: &str = "appinfo.json";

/// Presence of this file marks a project that predates the current layout.
pub const LEGACY_RESOURCE_MAP: &str = "resources/src/resource_map.json";

/// Build output directory, relative to the project root.
pub const BUILD_DIR: &str = "build";

/// Generated resources live under `build/resources/<source dir>/`.
pub const RESOURCES_BUILD_DIR: &str = "resources";

/// Source directory scanned for line counts.
pub const SOURCE_DIR: &str = "src";

/// Script sources live here; its presence sets `has_js`.
pub const SCRIPT_SOURCE_DIR: &str = "src/js";

pub const DEFAULT_BUILD_TOOL: &str = "waf";
pub const DEFAULT_SIZE_TOOL: &str = "arm-none-eabi-size";
pub const DEFAULT_ANALYZER_TOOL: &str = "arm-none-eabi-nm";
pub const DEFAULT_BINARY_NAME: &str = "app.elf";

/// Substring the build tool prints when no usable compiler was found.
pub const MISSING_COMPILER_MARKER: &str = "Could not determine the compiler version";

/// Substring the linker prints when the application region is too small.
pub const REGION_OVERFLOW_MARKER: &str = "region `APP' overflowed";

/// Name of the telemetry event emitted after a successful build.
pub const BUILD_SUCCEEDED_EVENT: &str = "app_build_succeeded";

/// Telemetry log written by the JSON-lines sink, inside the data directory.
pub const TELEMETRY_FILENAME: &str = "telemetry.jsonl";
