//! Runs the blurkit binary against small generated PNGs.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_blurkit"))
}

fn run(args: &[&str]) -> Output {
    Command::new(exe()).args(args).output().unwrap()
}

/// Writes a 16x12 RGB checkerboard.
fn write_checker(path: &Path) {
    let (w, h) = (16u32, 12u32);
    let mut data = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h {
        for x in 0..w {
            let v = if (x / 4 + y / 4) % 2 == 0 { 255 } else { 0 };
            data.extend_from_slice(&[v, v / 2, 255 - v]);
        }
    }
    let mut encoder = png::Encoder::new(BufWriter::new(File::create(path).unwrap()), w, h);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(&data).unwrap();
}

fn read_rgb(path: &Path) -> (u32, u32, Vec<u8>) {
    let decoder = png::Decoder::new(std::io::BufReader::new(File::open(path).unwrap()));
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0u8; reader.output_buffer_size().unwrap()];
    let info = reader.next_frame(&mut buf).unwrap();
    assert_eq!(info.color_type, png::ColorType::Rgb);
    buf.truncate(info.buffer_size());
    (info.width, info.height, buf)
}

#[test]
fn blur_writes_softened_image() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("checker.png");
    let output = dir.path().join("soft.png");
    write_checker(&input);

    let out = run(&[
        "-j",
        "2",
        "blur",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "-i",
        "2.0",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let (w, h, blurred) = read_rgb(&output);
    assert_eq!((w, h), (16, 12));
    let (_, _, original) = read_rgb(&input);
    assert_ne!(blurred, original);
    // Hard edges are gone: no red sample stays at 0 or 255
    assert!(blurred.chunks(3).all(|px| px[0] > 0 && px[0] < 255));
}

#[test]
fn zero_intensity_copies_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("checker.png");
    let output = dir.path().join("same.png");
    write_checker(&input);

    let out = run(&[
        "blur",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "-i",
        "0",
    ]);
    assert!(out.status.success());
    assert_eq!(read_rgb(&output).2, read_rgb(&input).2);
}

#[test]
fn out_of_range_intensity_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("checker.png");
    write_checker(&input);

    let out = run(&[
        "blur",
        input.to_str().unwrap(),
        "-o",
        dir.path().join("x.png").to_str().unwrap(),
        "-i",
        "11",
    ]);
    assert!(!out.status.success());
    assert!(!dir.path().join("x.png").exists());
}

#[test]
fn sweep_reports_cache_hits() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("checker.png");
    let frames = dir.path().join("frames");
    write_checker(&input);

    let out = run(&[
        "sweep",
        input.to_str().unwrap(),
        "--values",
        "1.0,2.0,1.0",
        "--interval-ms",
        "400",
        "--debounce-ms",
        "20",
        "-d",
        frames.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("2 computed"), "{stdout}");
    assert!(stdout.contains("1 from cache"), "{stdout}");
    assert!(frames.join("checker_1.0.png").exists());
    assert!(frames.join("checker_2.0.png").exists());
}

#[test]
fn kernel_prints_weights() {
    let out = run(&["kernel", "1.0", "--weights"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    // Intensity 1.0 -> sigma 2.0 -> 13 taps
    assert!(stdout.contains("size 13"), "{stdout}");
    assert!(stdout.contains("sum   1.000000"), "{stdout}");
}

#[test]
fn bad_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("engine.ron");
    std::fs::write(&config, "(cache: (max_entries: 0))").unwrap();

    let out = run(&["-c", config.to_str().unwrap(), "kernel", "1.0"]);
    assert!(!out.status.success());
}
