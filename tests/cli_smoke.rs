use std::path::{Path, PathBuf};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_frameblend")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "frameblend.exe"
            } else {
                "frameblend"
            });
            p
        })
}

fn run_cli(args: &[&str], input: &Path, output: &Path) -> std::process::ExitStatus {
    std::process::Command::new(exe())
        .arg("run")
        .arg("--in")
        .arg(input)
        .arg("--out")
        .arg(output)
        .args(args)
        .status()
        .unwrap()
}

fn smoke_dir() -> PathBuf {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn cli_line_blends_gray_png() {
    let dir = smoke_dir();
    let in_path = dir.join("gray_in.png");
    let out_path = dir.join("gray_out.png");
    let _ = std::fs::remove_file(&out_path);

    let img = image::GrayImage::from_fn(8, 4, |_, y| image::Luma([(y * 40) as u8]));
    img.save(&in_path).unwrap();

    let status = run_cli(&["--backend", "simd", "--kernel", "line-blend"], &in_path, &out_path);
    assert!(status.success());

    let out = image::open(&out_path).unwrap().into_luma8();
    assert_eq!(out.dimensions(), (8, 4));
    assert_eq!(out.get_pixel(3, 0).0[0], 0);
    assert_eq!(out.get_pixel(3, 1).0[0], 20);
    assert_eq!(out.get_pixel(3, 2).0[0], 80);
    assert_eq!(out.get_pixel(3, 3).0[0], 100);
}

#[test]
fn cli_blurs_colour_png() {
    let dir = smoke_dir();
    let in_path = dir.join("rgb_in.png");
    let out_path = dir.join("rgb_out.png");
    let _ = std::fs::remove_file(&out_path);

    let img = image::RgbImage::from_fn(6, 6, |x, y| {
        if (x, y) == (2, 2) {
            image::Rgb([160, 80, 16])
        } else {
            image::Rgb([0, 0, 0])
        }
    });
    img.save(&in_path).unwrap();

    let status = run_cli(
        &["--backend", "thread-pool", "--kernel", "blur", "--threads", "2"],
        &in_path,
        &out_path,
    );
    assert!(status.success());

    let out = image::open(&out_path).unwrap().into_rgb8();
    assert_eq!(out.get_pixel(2, 2).0, [40, 20, 4]);
    assert_eq!(out.get_pixel(1, 1).0, [10, 5, 1]);
    assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
}

#[test]
fn cli_rejects_unknown_image_extension() {
    let dir = smoke_dir();
    let in_path = dir.join("gray_in_ext.png");
    image::GrayImage::new(2, 2).save(&in_path).unwrap();
    let status = run_cli(&["--engine", "image"], &in_path, &dir.join("out.xyz"));
    assert!(!status.success());
}
