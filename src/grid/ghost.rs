// grid/ghost.rs
// Ghost-node classification by modular reduction of the linear index.

use super::GridShape;

/// True if `node` lies in a ghost layer of `shape`.
///
/// Starts at the innermost axis with unit stride and walks outward; each axis
/// looks at the index reduced modulo the next stride. Counts exactly one ghost
/// layer before every spatial axis.
pub fn is_ghost(shape: &GridShape, node: usize) -> bool {
    let sp = &shape.size_prod;
    let inner = (0..shape.rank).rev().find(|&d| sp[d] == 1).unwrap_or(0);

    for d in inner..shape.rank {
        let r = node % sp[d + 1];
        let ghost = if d == inner {
            r < 1 || r > shape.true_size[d]
        } else {
            r < sp[d] || r > sp[d] * (shape.true_size[d] + 1)
        };
        if ghost {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agrees_with_coordinate_test() {
        let shape = GridShape::scalar([4, 3, 5], [1, 1, 1, 1, 1, 1]).unwrap();
        let mut owned = 0;
        for node in 0..shape.len() {
            let geometric = !shape.is_true(shape.coords(node));
            assert_eq!(is_ghost(&shape, node), geometric, "node {node}");
            if !geometric {
                owned += 1;
            }
        }
        assert_eq!(owned, 4 * 3 * 5);
    }

    #[test]
    fn corner_and_face_nodes() {
        let shape = GridShape::scalar([2, 2, 2], [1, 1, 1, 1, 1, 1]).unwrap();
        assert!(is_ghost(&shape, 0));
        assert!(!is_ghost(&shape, shape.node([1, 1, 1])));
        assert!(!is_ghost(&shape, shape.node([2, 2, 2])));
        assert!(is_ghost(&shape, shape.node([3, 1, 1])));
        assert!(is_ghost(&shape, shape.node([1, 3, 1])));
        assert!(is_ghost(&shape, shape.node([1, 1, 3])));
        assert!(is_ghost(&shape, shape.len() - 1));
    }

    #[test]
    fn thicker_after_layers() {
        let shape = GridShape::scalar([3, 3, 3], [1, 1, 1, 2, 2, 2]).unwrap();
        for node in 0..shape.len() {
            assert_eq!(is_ghost(&shape, node), !shape.is_true(shape.coords(node)));
        }
    }
}
