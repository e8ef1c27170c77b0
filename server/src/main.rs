/*
 * Created on Thu Jul 02 2020
 *
 * This file is a part of Kestrel
 * Kestrel is a free and open-source in-memory key/value database that aims
 * to provide a simple, predictable data server for many concurrent clients
 * over plain TCP.
 *
 * Copyright (c) 2020, The Kestrel developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Kestrel
//!
//! The `kestreld` crate (or the `server` folder) is Kestrel's database
//! server and maybe is the most important part of the project. There are
//! several modules within this crate; see the modules for their respective
//! documentation.

use crate::config::ConfigType;
use crate::config::ServerConfig;
use env_logger::*;
use libkestrel::util::terminal;
use libkestrel::URL;
use libkestrel::VERSION;
use std::env;
use std::process;
use std::sync::Arc;

#[macro_use]
mod util;
mod actions;
mod config;
mod coredb;
mod dbnet;
mod queryengine;
mod services;
#[cfg(test)]
mod tests;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
use jemallocator::Jemalloc;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
#[global_allocator]
/// Jemallocator - this is the default memory allocator for platforms other than msvc
static GLOBAL: Jemalloc = Jemalloc;

/// The terminal art for `!noart` configurations
static TEXT: &str = "\n██   ██ ███████ ███████ ████████ ██████  ███████ ██      \n██  ██  ██      ██         ██    ██   ██ ██      ██      \n█████   █████   ███████    ██    ██████  █████   ██      \n██  ██  ██           ██    ██    ██   ██ ██      ██      \n██   ██ ███████ ███████    ██    ██   ██ ███████ ███████ \n";

/// The commands the server understands, printed as part of the startup banner
static COMMANDS: &str = "[GET],[SET],[DELETE],[FLUSH],[MGET],[MSET],[LPUSH],[RPUSH],[LPOP],[RPOP],[BLPOP],[BRPOP],[LLEN],[EXPIRE],[TTL],[PERSIST],[INFO]";

fn main() {
    Builder::new()
        .parse_filters(&env::var("KESTREL_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    let cfg = check_args_and_get_cfg();
    // Start the server which asynchronously waits for a CTRL+C signal
    // which will safely shut down the server
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("server")
        .enable_all()
        .build()
        .unwrap();
    let db = match runtime.block_on(dbnet::run(cfg)) {
        Ok(db) => db,
        Err(e) => {
            log::error!("{}", e);
            process::exit(0x100);
        }
    };
    // Make sure all background workers terminate
    drop(runtime);
    assert_eq!(
        Arc::strong_count(&db.shared),
        1,
        "Maybe the compiler reordered the drop causing more than one instance of CoreDB to live at this point"
    );
    log::info!("Stopped accepting incoming connections");
    terminal::write_info("Goodbye :)\n").unwrap();
}

/// This function checks the command line arguments and either returns a
/// config object or prints an error to `stderr` and terminates the server
fn check_args_and_get_cfg() -> ServerConfig {
    let cfg = match config::get_config() {
        Ok(ConfigType::Custom(cfg)) => {
            if cfg.noart {
                println!("Kestrel v{} | {}", VERSION, URL);
            } else {
                println!("Kestrel v{} | {}\n{}", VERSION, URL, TEXT);
            }
            log::info!("Using settings from supplied configuration");
            cfg
        }
        Ok(ConfigType::Def(cfg)) => {
            if cfg.noart {
                println!("Kestrel v{} | {}", VERSION, URL);
            } else {
                println!("Kestrel v{} | {}\n{}", VERSION, URL, TEXT);
            }
            log::warn!("No configuration supplied. Using default settings");
            cfg
        }
        Err(e) => {
            log::error!("{}", e);
            process::exit(0x100);
        }
    };
    println!("Running in {}:{}", cfg.host, cfg.port);
    println!("Available commands: {}", COMMANDS);
    cfg
}
