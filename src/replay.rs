//! Replay is not implemented. We only point at a transmit tool that can take
//! the extracted file as is.

use std::path::Path;

use tracing::debug;

use crate::chunk::{read_descriptor, sidecar_path, CaptureParams};

/// Build the advisory text for transmitting `infile` with `driver`
pub fn advice(infile: &Path, driver: &str) -> String {
    let params = match read_descriptor::<CaptureParams>(&sidecar_path(infile)) {
        Ok(params) => Some(params),
        Err(e) => {
            debug!("no usable descriptor next to {}: {e}", infile.display());
            None
        }
    };
    let (freq, rate) = match params {
        Some(p) => (p.center_freq_hz.to_string(), p.samp_rate_hz.to_string()),
        None => ("<freq_hz>".to_owned(), "<samp_rate>".to_owned()),
    };
    let mut text = format!("Replay is not implemented (driver '{driver}').");
    text.push_str(" For HackRF, consider piping via hackrf_transfer:\n");
    text.push_str(&format!(
        "    hackrf_transfer -t {} -f {freq} -s {rate} -x <tx_gain>\n",
        infile.display()
    ));
    // hackrf_transfer wants signed 8-bit IQ
    text.push_str("    (the slice is complex64 and needs converting to cs8 first)");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{write_descriptor, ExtractMeta, RequestedWindow};
    use chrono::Utc;

    #[test]
    fn test_fills_params_from_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        let slice = tmp.path().join("slice.iq");
        let meta = ExtractMeta {
            center_freq_hz: 433_920_000,
            samp_rate_hz: 2_400_000,
            timestamp_utc: Utc::now(),
            requested_window: RequestedWindow {
                start_rel_s: -10.0,
                duration_s: 5.0,
            },
        };
        write_descriptor(&sidecar_path(&slice), &meta).unwrap();
        let text = advice(&slice, "hackrf");
        assert!(text.contains("-f 433920000 -s 2400000"));
    }

    #[test]
    fn test_placeholders_without_descriptor() {
        let text = advice(Path::new("/nowhere/slice.iq"), "hackrf");
        assert!(text.contains("-f <freq_hz> -s <samp_rate>"));
    }
}
