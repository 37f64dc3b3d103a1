//! Renders recorded waveforms to a PNG through gnuplot.

use crate::channel::ChannelId;
use crate::waveform::LogDirectory;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("no waveform files available to plot")]
    NoData,
    #[error("failed to read waveform title of {channel} channel")]
    ReadTitle {
        channel: ChannelId,
        #[source]
        source: io::Error,
    },
    #[error("failed to run gnuplot")]
    Gnuplot(#[source] io::Error),
    #[error("gnuplot exited with {0}")]
    GnuplotFailed(ExitStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotSettings {
    /// Image file written by gnuplot, relative to its working directory.
    pub output: PathBuf,
    pub x_min: u64,
    pub x_max: u64,
    /// Width and height of the square image in pixels.
    pub size: u32,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            output: PathBuf::from("PlottedWaveform.png"),
            x_min: 10_000,
            x_max: 15_000,
            size: 1200,
        }
    }
}

/// One channel's waveform file and the title read from its first line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    pub channel: ChannelId,
    pub path: PathBuf,
    pub title: String,
}

impl ChannelId {
    fn plot_color(self) -> &'static str {
        match self {
            ChannelId::Green => "dark-green",
            ChannelId::Red => "red",
        }
    }

    fn plot_origin(self) -> &'static str {
        match self {
            ChannelId::Green => "0.0,0.5",
            ChannelId::Red => "0.0,0.0",
        }
    }
}

/// Collects the waveform files present in the log directory. Missing files are skipped.
pub fn collect_series(logs: &LogDirectory) -> Result<Vec<Series>, PlotError> {
    let mut series = Vec::new();

    for channel in ChannelId::ALL.iter().copied() {
        let path = logs.path_of(channel);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => return Err(PlotError::ReadTitle { channel, source }),
        };

        let mut title = String::new();
        BufReader::new(file)
            .read_line(&mut title)
            .map_err(|source| PlotError::ReadTitle { channel, source })?;

        series.push(Series {
            channel,
            path,
            title: title.trim_end_matches(&['\r', '\n'][..]).to_string(),
        });
    }

    Ok(series)
}

fn quoted(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Builds the gnuplot program drawing each series as a stepped trace in its own half of the image.
pub fn script(series: &[Series], settings: &PlotSettings) -> String {
    let mut lines = vec![
        format!("set terminal png size {0},{0}", settings.size),
        format!("set output {}", quoted(&settings.output.to_string_lossy())),
        "set multiplot".to_string(),
        "set xlabel 'Time (ms)'".to_string(),
        "set yrange [-1:2]".to_string(),
        "set ytics -1,1,2".to_string(),
        format!("set xrange [{}:{}]", settings.x_min, settings.x_max),
        "set datafile separator ','".to_string(),
    ];

    for entry in series {
        let path = quoted(&entry.path.to_string_lossy());
        let title = quoted(&format!("({})", entry.title));

        lines.push(format!("set origin {}", entry.channel.plot_origin()));
        lines.push("set size 1,0.5".to_string());
        lines.push("set ylabel 'High and Low State'".to_string());
        lines.push(format!(
            "plot {} using 1:2 with steps title {} linecolor '{}'",
            path,
            title,
            entry.channel.plot_color()
        ));
    }

    lines.push("unset multiplot".to_string());
    lines.push("exit".to_string());

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// Pipes `script` into the child's stdin, then waits for the child to exit.
///
/// The child is reaped even when the script cannot be written.
fn feed(child: &mut Child, script: &str) -> Result<ExitStatus, PlotError> {
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(script.as_bytes()),
        None => Ok(()),
    };

    let status = child.wait().map_err(PlotError::Gnuplot)?;
    written.map_err(PlotError::Gnuplot)?;
    Ok(status)
}

/// Plots every waveform in `logs` by piping the script into `gnuplot`.
pub fn render(logs: &LogDirectory, settings: &PlotSettings) -> Result<(), PlotError> {
    let series = collect_series(logs)?;
    if series.is_empty() {
        return Err(PlotError::NoData);
    }

    let mut child = Command::new("gnuplot")
        .arg("-persistent")
        .stdin(Stdio::piped())
        .spawn()
        .map_err(PlotError::Gnuplot)?;

    let status = feed(&mut child, &script(&series, settings))?;
    if !status.success() {
        return Err(PlotError::GnuplotFailed(status));
    }

    log::info!(
        "plotted {} waveform(s) to {}",
        series.len(),
        settings.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn series(channel: ChannelId, title: &str) -> Series {
        Series {
            channel,
            path: PathBuf::from(channel.waveform_file_name()),
            title: title.to_string(),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let name = format!("blink-trace-{}-{}", name, std::process::id());
        let dir = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn script_plots_each_series_as_steps() {
        let script = script(
            &[
                series(ChannelId::Green, "Green at 5Hz"),
                series(ChannelId::Red, "Red at 2Hz"),
            ],
            &PlotSettings::default(),
        );

        let preamble = "set terminal png size 1200,1200\nset output 'PlottedWaveform.png'\n";
        let green_plot = "plot 'green_waveform_data.csv' using 1:2 with steps \
                          title '(Green at 5Hz)' linecolor 'dark-green'\n";

        assert!(script.starts_with(preamble));
        assert!(script.contains("set xrange [10000:15000]\n"));
        assert!(script.contains(green_plot));
        assert!(script.contains("set origin 0.0,0.0\n"));
        assert!(script.ends_with("unset multiplot\nexit\n"));
    }

    #[test]
    fn quotes_in_titles_are_escaped() {
        let red = [series(ChannelId::Red, "it's red")];
        let script = script(&red, &PlotSettings::default());
        assert!(script.contains("title '(it''s red)'"));
    }

    #[test]
    fn titles_come_from_first_line_of_present_files() {
        let dir = scratch_dir("plot");
        let logs = LogDirectory::new(&dir);
        std::fs::write(logs.path_of(ChannelId::Red), "Red title\nBrightness\n").unwrap();

        let found = collect_series(&logs).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].channel, ChannelId::Red);
        assert_eq!(found[0].title, "Red title");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_directory_has_nothing_to_render() {
        let dir = scratch_dir("plot-empty");

        let err = render(&LogDirectory::new(&dir), &PlotSettings::default()).unwrap_err();
        assert!(matches!(err, PlotError::NoData));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn child_is_reaped_when_script_cannot_be_written() {
        let mut child = Command::new("sh")
            .args(&["-c", "exec 0<&-; sleep 0.3"])
            .stdin(Stdio::piped())
            .spawn()
            .unwrap();
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        let script = "set ytics -1,1,2\n".repeat(10_000);
        let err = feed(&mut child, &script).unwrap_err();

        match err {
            PlotError::Gnuplot(source) => assert_eq!(source.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(child.try_wait().unwrap().is_some());
    }
}
