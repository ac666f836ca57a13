//! Convert a volume between the supported formats, e.g. `.nii.gz` to
//! `.nrrd`. The format of each side is chosen by its file extension.

use std::env;

use medvol::MedVol;

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let input = args.next().expect("Input volume path is required");
    let output = args.next().expect("Output volume path is required");

    let volume = MedVol::<f32>::open(&input).expect("Failed to read volume");
    volume.save(&output).expect("Failed to write volume");
    println!("{} -> {}", input, output);
}
