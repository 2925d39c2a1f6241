// simulation.rs
// Contains the Simulation driver: per-rank state and the per-timestep cycle
// move -> purge -> collect -> photoemission -> deposit -> solve -> correct -> solve -> accelerate

use log::info;

use crate::comm::Communicator;
use crate::config::SimConfig;
use crate::error::Result;
use crate::grid::{Decomposition, Grid};
use crate::io::{self, GridSnapshot};
use crate::object::ObjectSet;
use crate::population::Population;
use crate::profile_scope;
use crate::solver::{self, PotentialSolver};
use crate::units::Units;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    pub frame: usize,
    /// Global particle count after the step.
    pub particles: usize,
    /// Particles that left the domain this step, all ranks.
    pub purged: usize,
    /// Particles absorbed by objects this step, all ranks.
    pub absorbed: usize,
    /// Charge collected by each object this step.
    pub collected: Vec<f64>,
    /// Photoelectrons emitted by each object this step.
    pub photoelectrons: Vec<f64>,
    /// Floating potential of each object.
    pub potentials: Vec<f64>,
    /// Charge on the grid after the correction, all ranks.
    pub total_charge: f64,
}

pub struct Simulation {
    pub config: SimConfig,
    pub units: Units,
    pub decomposition: Decomposition,
    pub objects: ObjectSet,
    pub solver: Box<dyn PotentialSolver>,
    pub population: Population,
    pub rho: Grid,
    /// Charge carried by the objects; accumulates over the run.
    pub rho_obj: Grid,
    pub phi: Grid,
    pub frame: usize,
}

impl Simulation {
    /// Validates the config, builds every component and the capacitance
    /// matrices. Particles seeded inside an object are removed without
    /// charging it. Collective.
    pub fn new(config: SimConfig, comm: &dyn Communicator) -> Result<Self> {
        profile_scope!("init");
        config.validate(comm.size())?;
        let decomposition = config.decomposition()?;
        let shape = decomposition.shape()?;
        let rank = comm.rank();

        let mut objects = ObjectSet::from_config(&config, &decomposition, comm)?;
        let mut solver = solver::from_config(&config, &decomposition, comm)?;

        let p = &config.population;
        let mut population = Population::new(p.charge.clone(), p.mass.clone(), &p.capacity)?;
        let n_species = p.n_species();
        for s in 0..n_species {
            let seed = p.seed + (rank * n_species + s) as u64;
            population.fill_uniform(s, p.n_initial[s], p.thermal_velocity[s], &shape, seed)?;
        }

        let mut rho_obj = Grid::zeros(shape.clone());
        if objects.n_objects > 0 {
            objects.compute_capacitance_matrices(solver.as_mut(), comm)?;
            if config.objects.photoemission {
                objects.compute_radiance(
                    config.spectrum.black_body_temp,
                    config.objects.distance_from_sun,
                    &config.units,
                    comm,
                );
            }
            objects.collect_object_charge(&mut population, &mut rho_obj, comm)?;
            rho_obj.zero();
        }

        let total = comm.all_reduce_sum_usize(population.total())?;
        if comm.is_root() {
            info!(
                "initialised {:?} grid on {} rank(s), {} solver, {} particle(s)",
                decomposition.global_true,
                comm.size(),
                solver.name(),
                total
            );
        }

        Ok(Self {
            units: config.units.clone(),
            config,
            decomposition,
            objects,
            solver,
            population,
            rho: Grid::zeros(shape.clone()),
            rho_obj,
            phi: Grid::zeros(shape),
            frame: 0,
        })
    }

    pub fn step(&mut self, comm: &dyn Communicator) -> Result<StepReport> {
        profile_scope!("step");
        let dt = self.config.time.step;
        let has_objects = self.objects.n_objects > 0;

        self.population.drift(dt);
        let purged = self.population.purge(&self.rho.shape);

        let mut report = StepReport::default();
        if has_objects {
            let collect = self
                .objects
                .collect_object_charge(&mut self.population, &mut self.rho_obj, comm)?;
            report.absorbed = collect.absorbed_global;
            report.collected = collect.charge;
            if self.config.objects.photoemission {
                report.photoelectrons = self.objects.collect_photoelectron_charge(
                    &self.population,
                    &mut self.rho_obj,
                    &self.units,
                    comm,
                )?;
            }
        }

        self.population.deposit(&mut self.rho);
        self.rho.add_from(&self.rho_obj);
        self.solver.solve(&self.rho, &mut self.phi, comm)?;
        if has_objects {
            report.potentials = self
                .objects
                .apply_capacitance_matrix(&mut self.rho, &self.phi, comm)?;
            self.solver.solve(&self.rho, &mut self.phi, comm)?;
        }
        self.population.accelerate(&self.phi, dt);
        self.frame += 1;

        report.frame = self.frame;
        report.purged = comm.all_reduce_sum_usize(purged)?;
        report.particles = comm.all_reduce_sum_usize(self.population.total())?;
        report.total_charge = comm.all_reduce_sum_scalar(self.rho.true_sum())?;
        if comm.is_root() {
            info!(
                "step {}: {} particle(s), {} left the domain, {} absorbed, total charge {:e}, potentials {:?}",
                report.frame, report.particles, report.purged, report.absorbed, report.total_charge, report.potentials
            );
        }

        let interval = self.config.output.interval;
        if interval > 0 && self.frame % interval == 0 {
            self.write_snapshots(comm.rank())?;
        }
        Ok(report)
    }

    fn write_snapshots(&self, rank: usize) -> Result<()> {
        profile_scope!("output");
        let out = &self.config.output;
        let dir = self.config.resolve(&out.dir);
        for (name, grid, scale) in [
            ("rhoObj", &self.rho_obj, self.units.charge_density),
            ("phi", &self.phi, self.units.potential),
        ] {
            let snapshot = GridSnapshot::from_grid(name, self.frame, rank, grid, scale);
            io::write_snapshot(&dir, &snapshot, out.format, out.compress)?;
        }
        Ok(())
    }

    pub fn run(&mut self, comm: &dyn Communicator) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(self.config.time.n_time_steps);
        for _ in 0..self.config.time.n_time_steps {
            reports.push(self.step(comm)?);
        }
        #[cfg(feature = "profiling")]
        if comm.is_root() {
            crate::PROFILER.lock().log_and_clear();
        }
        Ok(reports)
    }
}
