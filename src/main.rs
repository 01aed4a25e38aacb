use log::info;
use ndarray::array;
use wham_rs::testsystems::HarmonicUmbrella;
use wham_rs::*;

fn main() -> Result<()> {
    env_logger::init();

    let umbrella = HarmonicUmbrella::builder()
        .centres(array![0.0, 0.2, 0.4, 0.6, 0.8, 1.0])
        .spring_constants(array![40.0, 40.0, 60.0, 60.0, 80.0, 80.0])
        .build()?;
    let samples = umbrella.sample(1000, 2021)?;

    let mut wham = Wham::builder().threshold(1e-4).build()?;
    wham.setup(
        samples.view(),
        umbrella.temperature(),
        umbrella.spring_constants().view(),
        umbrella.centres().view(),
    )?;

    let convergence = wham.converge()?;
    info!("{:?}", convergence);

    if let Some(f) = wham.free_energies() {
        println!("window free energies: {}", f);
        println!("analytical:           {}", umbrella.analytical_free_energies());
    }

    let profile = wham.project_1d(array![1.0].view(), 25)?;
    for (edge, g) in profile.edges.iter().zip(profile.free_energy.iter()) {
        println!("{:8.4} {:10.4}", edge, g);
    }

    Ok(())
}
