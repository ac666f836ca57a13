//! An application for inspecting the geometry of a medical volume file.

use std::env;

use medvol::MedVol;

fn main() {
    let mut args = env::args().skip(1);
    let filename = args.next().expect("Path to a NIfTI or NRRD file is required");
    let volume = MedVol::<f32>::open(&filename).expect("Failed to read volume");

    println!("file      {}", filename);
    println!("shape     {:?}", volume.shape());
    println!("is_seg    {}", volume.is_seg());
    println!("spacing   {}", volume.spacing());
    println!("origin    {}", volume.origin());
    println!("direction {}", volume.direction());
    println!("affine    {}", volume.affine());
    if let Some(header) = volume.header() {
        println!("{:#?}", header);
    }
}
