// Job runner: one buffered chunked writer per destination, every input
// streamed through the same fan-out.
//
// Inputs are driven one after another with close_on_end = false, so all of
// them land in the same part sequences; only the last pipe finalizes.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{DestinationConfig, RuntimeConfig};
use crate::error::PipeError;
use crate::pipe::{close_all, BufferedSink, FanOutPipe, PipeOptions, ReaderSource, Sink, Source};
use crate::template::TemplateContext;
use crate::transform::LineMapping;
use crate::writer::{open_store, ChunkedWriter, ChunkedWriterConfig, PartStore};

/// Parts generated for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationReport {
    pub name: String,
    pub parts: Vec<String>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub inputs: usize,
    pub chunks: u64,
    pub bytes: u64,
    pub destinations: Vec<DestinationReport>,
}

impl RunReport {
    pub fn total_parts(&self) -> usize {
        self.destinations.iter().map(|d| d.parts.len()).sum()
    }
}

type Destination = BufferedSink<ChunkedWriter>;

/// Run a job against the storage backend named in `config`.
pub async fn run_with_config(config: &RuntimeConfig) -> Result<RunReport> {
    let store = open_store(&config.storage).context("Failed to initialize storage")?;
    run_with_store(config, Arc::new(store)).await
}

/// Run a job against an explicit part store.
pub async fn run_with_store(config: &RuntimeConfig, store: Arc<dyn PartStore>) -> Result<RunReport> {
    let paths = input_paths(config);
    if config.destinations.is_empty() {
        warn!("No destinations configured; input will be read and discarded");
    }

    let context = TemplateContext::new(&paths[0]);
    let mut destinations = open_destinations(config, &context, &store).await?;

    let mut report = RunReport {
        inputs: paths.len(),
        ..RunReport::default()
    };

    for (index, path) in paths.iter().enumerate() {
        let options = PipeOptions {
            close_on_end: index + 1 == paths.len(),
        };
        let mut sinks = sink_refs(&mut destinations);

        let result = match open_source(path, config.source.chunk_size).await {
            Ok(mut source) => FanOutPipe::new(options).drive(source.as_mut(), &mut sinks).await,
            Err(err) => {
                let _ = close_all(&mut sinks, Some(&err)).await;
                Err(err)
            }
        };
        let summary = result.with_context(|| format!("Failed to stream '{}'", path))?;

        info!(
            input = %path,
            chunks = summary.chunks,
            bytes = summary.bytes,
            "Input streamed"
        );
        report.chunks += summary.chunks;
        report.bytes += summary.bytes;
    }

    for (sink, destination) in destinations.into_iter().zip(&config.destinations) {
        let writer = sink
            .into_inner()
            .await
            .with_context(|| format!("Destination '{}' did not shut down", destination.name))?;
        for part in writer.parts() {
            info!(destination = %destination.name, part = %part, "Generated part");
        }
        report.destinations.push(DestinationReport {
            name: destination.name.clone(),
            parts: writer.parts().to_vec(),
        });
    }

    Ok(report)
}

fn input_paths(config: &RuntimeConfig) -> Vec<String> {
    if config.source.paths.is_empty() {
        vec!["-".to_string()]
    } else {
        config.source.paths.clone()
    }
}

async fn open_destinations(
    config: &RuntimeConfig,
    context: &TemplateContext,
    store: &Arc<dyn PartStore>,
) -> Result<Vec<Destination>> {
    let mut opened: Vec<Destination> = Vec::with_capacity(config.destinations.len());

    for destination in &config.destinations {
        let created = match writer_config(destination, context) {
            Ok(writer_config) => {
                ChunkedWriter::create_named(&destination.name, writer_config, Arc::clone(store)).await
            }
            Err(err) => Err(err),
        };
        match created {
            Ok(writer) => {
                opened.push(BufferedSink::spawn(writer, config.pipe.high_water_mark));
            }
            Err(err) => {
                let _ = close_all(&mut sink_refs(&mut opened), Some(&err)).await;
                return Err(err)
                    .with_context(|| format!("Failed to open destination '{}'", destination.name));
            }
        }
    }

    Ok(opened)
}

/// Chunked writer options for one destination, with its templates bound to
/// this run.
pub fn writer_config(
    destination: &DestinationConfig,
    context: &TemplateContext,
) -> Result<ChunkedWriterConfig, PipeError> {
    let context = context.for_filename(destination.filename());

    let mut config = ChunkedWriterConfig::new(destination.filename())
        .with_path(destination.path.as_str())
        .with_extension(destination.extension.as_str())
        .with_max_part_bytes(destination.max_part_bytes);

    if let Some(template) = destination.filename_template.clone() {
        let context = context.clone();
        config = config.with_filename_fn(move |part| context.render(&template, part));
    }
    if let Some(header) = destination.header.clone() {
        let context = context.clone();
        config = config.with_header(move |part| context.render(&header, part));
    }
    if let Some(transform) = &destination.transform {
        config = config.with_transform(LineMapping::from_config(transform)?);
    }
    Ok(config)
}

async fn open_source(path: &str, chunk_size: usize) -> Result<Box<dyn Source>, PipeError> {
    if path == "-" {
        return Ok(Box::new(ReaderSource::stdin(chunk_size)));
    }
    let source = ReaderSource::open(path, chunk_size).await?;
    Ok(Box::new(source))
}

fn sink_refs(destinations: &mut [Destination]) -> Vec<&mut dyn Sink> {
    destinations
        .iter_mut()
        .map(|sink| sink as &mut dyn Sink)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformConfig;
    use time::macros::datetime;

    fn context() -> TemplateContext {
        TemplateContext::at("master.txt", datetime!(2024-01-02 03:04:05 UTC), "r1".to_string())
    }

    #[test]
    fn writer_config_binds_templates() {
        let mut destination = DestinationConfig::new("gwl");
        destination.path = "exports".to_string();
        destination.filename_template = Some("{filename}_{timestamp}_{part}".to_string());
        destination.header = Some("H|{source}|{part}".to_string());

        let config = writer_config(&destination, &context()).unwrap();
        assert_eq!(config.part_key(2), "exports/gwl_20240102030405_2.txt");
        assert_eq!(config.header_for(2).as_deref(), Some("H|master|2\n"));
    }

    #[test]
    fn writer_config_without_templates_uses_defaults() {
        let mut destination = DestinationConfig::new("costcenter");
        destination.transform = Some(TransformConfig::default());

        let config = writer_config(&destination, &context()).unwrap();
        assert_eq!(config.part_key(1), "costcenter-part-1.txt");
        assert!(config.header_for(1).is_none());
    }

    #[test]
    fn stdin_is_the_default_input() {
        assert_eq!(input_paths(&RuntimeConfig::default()), vec!["-"]);
    }
}
