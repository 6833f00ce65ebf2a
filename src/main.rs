// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{bail, Context};
use esgcrawl::application::use_cases::crawl_use_case::CrawlPipeline;
use esgcrawl::config::settings::Settings;
use esgcrawl::utils::telemetry;
use tracing::info;

const USAGE: &str = "usage: esgcrawl <url> [--direct]";

/// 主函数
///
/// 爬取命令行给出的站点并以JSON输出报告。默认经由Tor，`--direct` 时走代理池或直连。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();

    // 2. Parse arguments
    let mut url = None;
    let mut use_anonymity = true;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--direct" => use_anonymity = false,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ if url.is_none() => url = Some(arg),
            _ => bail!("unexpected argument: {}\n{}", arg, USAGE),
        }
    }
    let Some(url) = url else {
        bail!(USAGE);
    };

    // 3. Load and validate configuration
    let settings = Settings::new().context("Failed to load configuration")?;
    settings.validate()?;
    info!("Configuration loaded");

    // 4. Build the pipeline
    let pipeline = CrawlPipeline::from_settings(&settings).await?;

    // 5. Crawl and print the report
    let report = pipeline.run_crawl(&url, use_anonymity).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
