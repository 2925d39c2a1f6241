// Scenario tests for the object core: lookup tables on cubes, global numbering
// across ranks, capacitance matrices, charge collection and the full
// collect-solve-correct cycle, plus photoemission onto the sunlit face.

use super::*;
use crate::comm::{Communicator, LocalGroup, SingleRank};
use crate::grid::{is_ghost, Decomposition, Grid};
use crate::io::MaskDataset;
use crate::population::Population;
use crate::solver::{DirectSolver, PotentialSolver};
use approx::assert_relative_eq;
use nalgebra::DMatrix;

const GLOBAL: [usize; 3] = [10, 10, 10];

/// Cube of `cells` mask cells per axis starting at global `lo`.
fn cube_mask(lo: usize, cells: usize) -> MaskDataset {
    let mut mask = MaskDataset::vacuum(GLOBAL);
    mask.fill_cube([lo; 3], cells, 0).unwrap();
    mask
}

fn build(mask: &MaskDataset, split: [usize; 3], comm: &dyn Communicator) -> Result<(Decomposition, ObjectSet)> {
    let dec = Decomposition::new(mask.size, split, [1; 6])?;
    let domain = dec.extract_mask(comm.rank(), mask)?;
    Ok((dec, ObjectSet::new(domain, comm)?))
}

fn electrons_and_ions() -> Population {
    Population::new(vec![-1.0, 1.0], vec![1.0, 1836.0], &[64, 64]).unwrap()
}

#[cfg(test)]
mod lookup_tables {
    use super::*;

    #[test]
    fn cube_counts_follow_node_side() {
        for side in [3usize, 4, 5] {
            let (_, objects) = build(&cube_mask(3, side - 1), [1, 1, 1], &SingleRank).unwrap();
            assert_eq!(objects.n_objects, 1);
            assert_eq!(objects.interior.count(0), (side - 1).pow(3), "side {side}");
            assert_eq!(objects.surface.count(0), side.pow(3) - (side - 2).pow(3), "side {side}");

            let shape = &objects.domain.shape;
            let corners = shape.cell_corners();
            let enclosed = (0..shape.len())
                .filter(|&b| !is_ghost(shape, b))
                .filter(|&b| {
                    corners
                        .iter()
                        .all(|o| objects.domain.val[(b as isize + o) as usize] == 1.0)
                })
                .count();
            assert_eq!(enclosed, (side - 2).pow(3), "side {side}");
        }
    }

    #[test]
    fn offsets_are_monotone_and_tables_avoid_ghosts() {
        let mut mask = MaskDataset::vacuum(GLOBAL);
        mask.fill_cube([1, 1, 1], 2, 0).unwrap();
        mask.fill_cube([5, 5, 5], 3, 1).unwrap();
        let (_, objects) = build(&mask, [1, 1, 1], &SingleRank).unwrap();
        assert_eq!(objects.n_objects, 2);

        for table in [&objects.interior, &objects.surface, &objects.exposed] {
            assert_eq!(table.offsets.len(), 3);
            assert!(table.offsets.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(table.offsets[2], table.len());
        }
        let shape = &objects.domain.shape;
        for &n in objects.surface.nodes.iter().chain(&objects.exposed.nodes) {
            assert!(!is_ghost(shape, n));
        }
        assert_eq!(objects.surface.count(0), 26);
        assert_eq!(objects.surface.count(1), 64 - 8);
    }

    #[test]
    fn exposed_nodes_face_negative_x() {
        let side = 4;
        let (_, objects) = build(&cube_mask(3, side - 1), [1, 1, 1], &SingleRank).unwrap();
        assert_eq!(objects.exposed.count(0), side * side);
        let shape = &objects.domain.shape;
        // Global x = 3 is local x = 4 behind one ghost layer.
        assert!(objects.exposed.bucket(0).iter().all(|&n| shape.coords(n)[0] == 4));
    }

    #[test]
    fn missing_ids_leave_empty_buckets() {
        let mut mask = MaskDataset::vacuum(GLOBAL);
        mask.fill_cube([2, 2, 2], 2, 2).unwrap();
        let (_, objects) = build(&mask, [1, 1, 1], &SingleRank).unwrap();
        assert_eq!(objects.n_objects, 3);
        assert_eq!(objects.surface.offsets[..3], [0, 0, 0]);
        assert_eq!(objects.inv_nr_surf_nod[0], 0.0);
        assert_relative_eq!(objects.inv_nr_surf_nod[2], 1.0 / 26.0);
    }

    #[test]
    fn global_numbering_is_consistent_across_ranks() {
        // Node x = 3..=6 straddles the split at global x = 5.
        let mask = cube_mask(3, 3);
        let (_, serial) = build(&mask, [1, 1, 1], &SingleRank).unwrap();
        let total = serial.index_map.total(0);

        let per_rank = LocalGroup::run(2, |comm| {
            let (_, objects) = build(&mask, [2, 1, 1], comm)?;
            Ok((objects.n_objects, objects.surface.count(0), objects.index_map.clone()))
        })
        .unwrap();

        let local_sum: usize = per_rank.iter().map(|(_, c, _)| c).sum();
        assert_eq!(local_sum, total);
        for (rank, (n_objects, count, map)) in per_rank.iter().enumerate() {
            assert_eq!(*n_objects, 1);
            assert_eq!(map, &per_rank[0].2);
            assert_eq!(map.total(0), total);
            assert_eq!(map.range(0, rank).len(), *count);
        }
        assert!(per_rank.iter().all(|(_, c, _)| *c > 0));
    }
}

#[cfg(test)]
mod capacitance {
    use super::*;

    #[test]
    fn potential_matrix_is_symmetric_and_invertible() {
        let (dec, objects) = build(&cube_mask(3, 2), [1, 1, 1], &SingleRank).unwrap();
        let mut solver = DirectSolver::new(dec, 0);
        let m = objects.assemble_potential_matrix(0, &mut solver, &SingleRank).unwrap();
        assert_eq!(m.nrows(), 26);

        for k in 0..26 {
            assert!(m.row(k).sum() > 0.0);
            for i in 0..26 {
                assert_eq!(m[(k, i)], m[(i, k)]);
            }
        }

        let cap = CapacitanceMatrix::invert(0, m.clone()).unwrap();
        let residual = (&m * &cap.inverse - DMatrix::<f64>::identity(26, 26)).abs().max();
        assert!(residual < 1e-10, "residual {residual:e}");
        assert!(cap.inv_total > 0.0);
    }

    #[test]
    fn singular_matrices_are_fatal() {
        let ones = DMatrix::<f64>::from_element(3, 3, 1.0);
        assert!(matches!(
            CapacitanceMatrix::invert(4, ones),
            Err(PicError::SingularCapacitance { object: 4, dim: 3, .. })
        ));
        assert!(CapacitanceMatrix::invert(0, DMatrix::<f64>::zeros(0, 0)).is_err());
    }

    #[test]
    fn object_without_surface_cannot_be_inverted() {
        let mut mask = MaskDataset::vacuum(GLOBAL);
        mask.fill_cube([2, 2, 2], 2, 1).unwrap();
        let (dec, mut objects) = build(&mask, [1, 1, 1], &SingleRank).unwrap();
        let mut solver = DirectSolver::new(dec, 0);
        let err = objects
            .compute_capacitance_matrices(&mut solver, &SingleRank)
            .unwrap_err();
        assert!(matches!(err, PicError::SingularCapacitance { object: 0, dim: 0, .. }));
    }

    #[test]
    fn split_domain_gives_the_same_total() {
        let mask = cube_mask(3, 3);
        let (dec, mut serial) = build(&mask, [1, 1, 1], &SingleRank).unwrap();
        let mut solver = DirectSolver::new(dec, 0);
        serial.compute_capacitance_matrices(&mut solver, &SingleRank).unwrap();

        let totals = LocalGroup::run(2, |comm| {
            let (dec, mut objects) = build(&mask, [2, 1, 1], comm)?;
            let mut solver = DirectSolver::new(dec, comm.rank());
            objects.compute_capacitance_matrices(&mut solver, comm)?;
            Ok(objects.capacitance[0].inv_total)
        })
        .unwrap();
        assert_eq!(totals[0], totals[1]);
        assert_relative_eq!(totals[0], serial.capacitance[0].inv_total, max_relative = 1e-10);
    }

    #[test]
    fn apply_before_compute_is_an_error() {
        let (_, mut objects) = build(&cube_mask(3, 2), [1, 1, 1], &SingleRank).unwrap();
        let mut rho = Grid::zeros(objects.domain.shape.clone());
        let phi = rho.clone();
        assert!(objects.apply_capacitance_matrix(&mut rho, &phi, &SingleRank).is_err());
    }

    #[test]
    fn correction_is_idempotent() {
        let (dec, mut objects) = build(&cube_mask(3, 3), [1, 1, 1], &SingleRank).unwrap();
        let mut solver = DirectSolver::new(dec, 0);
        objects.compute_capacitance_matrices(&mut solver, &SingleRank).unwrap();

        let mut rho = Grid::zeros(objects.domain.shape.clone());
        let mut phi = rho.clone();
        let outside = rho.shape.node([2, 2, 8]);
        rho.val[outside] = 0.3;
        objects.set_surface_values(&mut rho, 0, 0.01);

        solver.solve(&rho, &mut phi, &SingleRank).unwrap();
        let first = objects.apply_capacitance_matrix(&mut rho, &phi, &SingleRank).unwrap();
        solver.solve(&rho, &mut phi, &SingleRank).unwrap();
        let corrected = rho.clone();
        let second = objects.apply_capacitance_matrix(&mut rho, &phi, &SingleRank).unwrap();

        assert_relative_eq!(first[0], second[0], max_relative = 1e-9);
        let scale = corrected.val.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        for (a, b) in rho.val.iter().zip(&corrected.val) {
            assert!((a - b).abs() <= 1e-9 * scale);
        }
    }
}

#[cfg(test)]
mod collection {
    use super::*;

    #[test]
    fn absorbed_charge_is_conserved() {
        // Cells at global 3..=6, local 4..=7.
        let (_, objects) = build(&cube_mask(3, 4), [1, 1, 1], &SingleRank).unwrap();
        let mut pop = electrons_and_ions();
        let inside = [[4.5, 4.5, 4.5], [7.9, 4.0, 6.2], [5.0, 5.0, 5.0], [6.5, 7.5, 4.1]];
        let outside = [[2.5, 4.5, 4.5], [8.0, 5.0, 5.0], [5.0, 5.0, 3.9]];
        // Consecutive insiders check that the particle swapped into a freed slot is examined.
        for p in inside.iter().chain(&outside).chain(&inside) {
            pop.push(0, *p, [0.0; 3]).unwrap();
        }
        pop.push(1, inside[1], [0.0; 3]).unwrap();
        pop.push(1, outside[0], [0.0; 3]).unwrap();

        let mut rho_obj = Grid::zeros(objects.domain.shape.clone());
        let report = objects.collect_object_charge(&mut pop, &mut rho_obj, &SingleRank).unwrap();

        assert_eq!(report.absorbed_local, 9);
        assert_eq!(report.absorbed_global, 9);
        assert_eq!(pop.count(0), outside.len());
        assert_eq!(pop.count(1), 1);
        assert_relative_eq!(report.charge[0], -7.0);
        assert_relative_eq!(rho_obj.true_sum(), -7.0, max_relative = 1e-12);

        let share = -7.0 / objects.index_map.total(0) as f64;
        for &node in objects.surface.bucket(0) {
            assert_relative_eq!(rho_obj.val[node], share);
        }
        for i in pop.i_start[0]..pop.i_stop[0] {
            let p = pop.position(i);
            let cell = objects.domain.shape.node([p[0] as usize, p[1] as usize, p[2] as usize]);
            assert_eq!(objects.object_at(cell), None);
        }
    }

    #[test]
    fn charges_from_all_ranks_reach_every_surface_node() {
        let mask = cube_mask(3, 3);
        let sums = LocalGroup::run(2, |comm| {
            let (_, objects) = build(&mask, [2, 1, 1], comm)?;
            let mut pop = electrons_and_ions();
            if comm.rank() == 1 {
                // Global (5.5, 4.5, 4.5) is local (1.5, 5.5, 5.5) on the right block.
                pop.push(0, [1.5, 5.5, 5.5], [0.0; 3])?;
                pop.push(0, [1.5, 5.5, 5.5], [0.0; 3])?;
            }
            let mut rho_obj = Grid::zeros(objects.domain.shape.clone());
            let report = objects.collect_object_charge(&mut pop, &mut rho_obj, comm)?;
            let local: f64 = objects.surface.bucket(0).iter().map(|&n| rho_obj.val[n]).sum();
            let total = comm.all_reduce_sum_scalar(local)?;
            Ok((report.absorbed_global, total))
        })
        .unwrap();
        for (absorbed, total) in sums {
            assert_eq!(absorbed, 2);
            assert_relative_eq!(total, -2.0, max_relative = 1e-12);
        }
    }
}

#[cfg(test)]
mod end_to_end {
    use super::*;

    /// One particle of charge `q` absorbed by a 2x2x2-cell cube, then the full
    /// solve-correct-solve cycle. Returns the floating potential.
    fn absorb_and_correct(split: [usize; 3], comm: &dyn Communicator) -> Result<f64> {
        let q = -1.0;
        let (dec, mut objects) = build(&cube_mask(3, 2), split, comm)?;
        let mut solver = DirectSolver::new(dec.clone(), comm.rank());
        objects.compute_capacitance_matrices(&mut solver, comm)?;

        let mut pop = electrons_and_ions();
        // Owned by the rank whose block holds global (4.5, 4.5, 4.5).
        let off = dec.offset(comm.rank());
        let local = |g: f64, d: usize| g - off[d] as f64 + 1.0;
        if (0..3).all(|d| (off[d]..off[d] + dec.local_true()[d]).contains(&4)) {
            pop.push(0, [local(4.5, 0), local(4.5, 1), local(4.5, 2)], [0.0; 3])?;
        }

        let mut rho_obj = Grid::zeros(objects.domain.shape.clone());
        let report = objects.collect_object_charge(&mut pop, &mut rho_obj, comm)?;
        assert_eq!(report.absorbed_global, 1);
        assert_eq!(objects.index_map.total(0), 26);
        for &node in objects.surface.bucket(0) {
            assert_relative_eq!(rho_obj.val[node], q / 26.0);
        }

        let mut rho = rho_obj.clone();
        let mut phi = Grid::zeros(rho.shape.clone());
        solver.solve(&rho, &mut phi, comm)?;
        let potentials = objects.apply_capacitance_matrix(&mut rho, &phi, comm)?;
        solver.solve(&rho, &mut phi, comm)?;

        let phi_c = potentials[0];
        for &node in objects.surface.bucket(0) {
            assert_relative_eq!(phi.val[node], phi_c, max_relative = 1e-9);
        }
        let total = comm.all_reduce_sum_scalar(rho.true_sum())?;
        assert_relative_eq!(total, q, max_relative = 1e-9);
        Ok(phi_c)
    }

    #[test]
    fn single_rank_cube_floats_uniformly() {
        let phi_c = absorb_and_correct([1, 1, 1], &SingleRank).unwrap();
        // A negatively charged conductor floats below zero.
        assert!(phi_c < 0.0);
    }

    #[test]
    fn split_cube_matches_single_rank() {
        let serial = absorb_and_correct([1, 1, 1], &SingleRank).unwrap();
        let split = LocalGroup::run(2, |comm| absorb_and_correct([2, 1, 1], comm)).unwrap();
        assert_eq!(split[0], split[1]);
        assert_relative_eq!(split[0], serial, max_relative = 1e-9);
    }
}

#[cfg(test)]
mod photoemission {
    use super::*;
    use crate::units::{Units, PLANCK, SPEED_OF_LIGHT};

    #[test]
    fn photons_carry_at_least_the_work_function() {
        let (_, mut objects) = build(&cube_mask(3, 3), [1, 1, 1], &SingleRank).unwrap();
        let sigma = 37_000.0;
        objects.set_materials(&[sigma], &[0.5]).unwrap();
        objects.compute_radiance(5778.0, 1.496e11, &Units::default(), &SingleRank);
        assert!(objects.radiance[0] > 0.0);
        let per_photon = objects.band_energy[0] / objects.radiance[0];
        assert!(per_photon > PLANCK * SPEED_OF_LIGHT * sigma * 100.0);
    }

    #[test]
    fn emitted_charge_lands_on_sunlit_face() {
        let (_, mut objects) = build(&cube_mask(3, 3), [1, 1, 1], &SingleRank).unwrap();
        objects.radiance[0] = 10.5;
        let units = Units {
            weights: vec![2.0, 1.0],
            ..Units::default()
        };
        let pop = electrons_and_ions();
        let mut rho_obj = Grid::zeros(objects.domain.shape.clone());

        let emitted = objects
            .collect_photoelectron_charge(&pop, &mut rho_obj, &units, &SingleRank)
            .unwrap();
        assert_eq!(emitted, vec![5.0]);
        assert_eq!(objects.exposed.count(0), 16);
        for &node in objects.exposed.bucket(0) {
            assert_relative_eq!(rho_obj.val[node], 5.0 / 16.0);
        }
        assert_relative_eq!(rho_obj.true_sum(), 5.0, max_relative = 1e-12);
    }

    #[test]
    fn no_negative_species_emits_nothing() {
        let (_, mut objects) = build(&cube_mask(3, 3), [1, 1, 1], &SingleRank).unwrap();
        objects.radiance[0] = 100.0;
        let units = Units {
            weights: vec![1.0],
            ..Units::default()
        };
        let ions = Population::new(vec![1.0], vec![1836.0], &[4]).unwrap();
        let mut rho_obj = Grid::zeros(objects.domain.shape.clone());
        let emitted = objects
            .collect_photoelectron_charge(&ions, &mut rho_obj, &units, &SingleRank)
            .unwrap();
        assert_eq!(emitted, vec![0.0]);
        assert!(rho_obj.val.iter().all(|&v| v == 0.0));
    }
}
