/// Compile-time settings exported to the crate, with the fallback used when
/// neither the environment nor `.env` provides a value.
const SETTINGS: &[(&str, &str)] = &[
    ("WIFI_SSID", ""),
    ("WIFI_PASSWORD", ""),
    ("SERVER_URL", "http://192.168.1.100:5000"),
    ("API_KEY", ""),
    ("DEVICE_ID", "DOORBELL_001"),
    ("LOCATION", "front_door"),
];

fn main() {
    // Load .env file for WiFi and server configuration
    load_env_config();

    // Host builds (unit and integration tests) link normally.
    let firmware = std::env::var_os("CARGO_FEATURE_FIRMWARE").is_some();
    let riscv = std::env::var("CARGO_CFG_TARGET_ARCH").is_ok_and(|arch| arch == "riscv32");
    if firmware && riscv {
        linker_be_nice();
        // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
        println!("cargo:rustc-link-arg=-Tlinkall.x");
    }
}

/// Load environment configuration from .env file
/// Environment variables take priority over .env file values
fn load_env_config() {
    use std::env;
    use std::path::Path;

    // Tell cargo to rerun this build script if .env file changes
    println!("cargo:rerun-if-changed=.env");

    for (key, _) in SETTINGS {
        println!("cargo:rerun-if-env-changed={}", key);
    }

    // Try to load .env file if it exists
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => println!("cargo:warning=Loaded .env file"),
            Err(e) => println!("cargo:warning=Failed to load .env file: {}", e),
        }
    }

    for (key, fallback) in SETTINGS {
        // Note: We need to handle the case where env vars are set to empty strings
        let value = env::var(key)
            .map(|v| v.trim().to_string())
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| fallback.to_string());

        println!("cargo:rustc-env={}={}", key, value);

        match *key {
            "WIFI_PASSWORD" | "API_KEY" if !value.is_empty() => {
                println!("cargo:warning={} configured (length: {})", key, value.len());
            }
            _ if value.is_empty() => {
                println!("cargo:warning={} is empty - set it in .env before flashing", key);
            }
            _ => {}
        }
    }
}

fn linker_be_nice() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        let kind = &args[1];
        let what = &args[2];

        match kind.as_str() {
            "undefined-symbol" => match what.as_str() {
                "_defmt_timestamp" => {
                    eprintln!();
                    eprintln!("💡 `defmt` not found - make sure `defmt.x` is added as a linker script and you have included `use defmt_rtt as _;`");
                    eprintln!();
                }
                "_stack_start" => {
                    eprintln!();
                    eprintln!("💡 Is the linker script `linkall.x` missing?");
                    eprintln!();
                }
                "esp_wifi_preempt_enable"
                | "esp_wifi_preempt_yield_task"
                | "esp_wifi_preempt_task_create" => {
                    eprintln!();
                    eprintln!("💡 `esp-wifi` has no scheduler enabled. Make sure you have the `builtin-scheduler` feature enabled, or that you provide an external scheduler.");
                    eprintln!();
                }
                _ => (),
            },
            // we don't have anything helpful for "missing-lib" yet
            _ => {
                std::process::exit(1);
            }
        }

        std::process::exit(0);
    }

    println!(
        "cargo:rustc-link-arg=--error-handling-script={}",
        std::env::current_exe().unwrap().display()
    );
}
