// Copyright 2025 JiangLong.
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

//! Process-wide log sink
//!
//! Every event is rendered as `<timestamp> [<LEVEL>] <message>` and written
//! both to the terminal and, appended, to the provisioning log file. The log
//! file outlives the process: operators read a control-plane run's output
//! from it when preparing worker runs.

use crate::infrastructure::constants::LOG_TIMESTAMP_FORMAT;
use chrono::Local;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{DefaultFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Event formatter producing one `<timestamp> [<LEVEL>] <message>` line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLineFormat;

impl<S, N> FormatEvent<S, N> for LogLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} [{}] ",
            Local::now().format(LOG_TIMESTAMP_FORMAT),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// A fmt layer writing [`LogLineFormat`] lines to `make_writer`.
pub fn line_layer<S, W>(
    make_writer: W,
) -> tracing_subscriber::fmt::Layer<S, DefaultFields, LogLineFormat, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    tracing_subscriber::fmt::layer()
        .event_format(LogLineFormat)
        .with_ansi(false)
        .with_writer(make_writer)
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber: terminal plus append-only log file.
/// If the log file cannot be opened, logging continues on the terminal only.
pub fn init(log_file: &Path) {
    let file_layer = match open_log_file(log_file) {
        Ok(file) => Some(line_layer(Arc::new(file))),
        Err(err) => {
            eprintln!("Log file {} not available: {}", log_file.display(), err);
            None
        }
    };

    let subscriber = Registry::default()
        .with(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .with(line_layer(std::io::stdout))
        .with(file_layer);

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set log subscriber: {}", err);
    }
}
