use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};

/// Elementwise activation applied after the affine map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActFn {
    Relu,
    Sigmoid,
}

impl ActFn {
    #[inline]
    pub fn f(self, z: f32) -> f32 {
        match self {
            ActFn::Relu => z.max(0.0),
            ActFn::Sigmoid => 1.0 / (1.0 + (-z).exp()),
        }
    }

    #[inline]
    pub fn df(self, z: f32) -> f32 {
        match self {
            ActFn::Relu => {
                if z > 0.0 { 1.0 } else { 0.0 }
            }
            ActFn::Sigmoid => {
                let s = self.f(z);
                s * (1.0 - s)
            }
        }
    }
}

/// Fully connected layer over a flat parameter slice.
///
/// The layer owns no parameters: `forward`/`backward` receive its slice of
/// the model's flat buffer and view it as `(in_dim, out_dim)` weights
/// followed by `out_dim` biases. Forward intermediates are cached for the
/// backward pass.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    name: String,
    in_dim: usize,
    out_dim: usize,
    act: Option<ActFn>,

    // Forward cache
    x: Array2<f32>,
    z: Array2<f32>,
}

impl DenseLayer {
    pub fn new(name: impl Into<String>, in_dim: usize, out_dim: usize, act: Option<ActFn>) -> Self {
        assert!(in_dim > 0 && out_dim > 0, "degenerate layer dims");

        Self {
            name: name.into(),
            in_dim,
            out_dim,
            act,
            x: Array2::zeros((0, 0)),
            z: Array2::zeros((0, 0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Number of trainable scalars in this layer.
    pub fn size(&self) -> usize {
        (self.in_dim + 1) * self.out_dim
    }

    /// Computes `act(x W + b)` and caches what backward needs.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Array2<f32> {
        let (w, b) = self.view_params(params);

        let mut z = x.dot(&w);
        z += &b;

        self.x = x.to_owned();

        let out = match self.act {
            None => z.clone(),
            Some(act) => z.mapv(|v| act.f(v)),
        };
        self.z = z;
        out
    }

    /// Accumulates `dL/dW` and `dL/db` into this layer's gradient slice and
    /// returns `dL/dx` for the layer below. `d` is the loss gradient w.r.t.
    /// this layer's output.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: Array2<f32>) -> Array2<f32> {
        if let Some(act) = self.act {
            d.zip_mut_with(&self.z, |d, &z| *d *= act.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad);
        dw.assign(&self.x.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params);
        d.dot(&w.t())
    }

    fn weight_len(&self) -> usize {
        self.in_dim * self.out_dim
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> (ArrayView2<'a, f32>, ArrayView1<'a, f32>) {
        let (w_raw, b_raw) = params.split_at(self.weight_len());
        let w = ArrayView2::from_shape((self.in_dim, self.out_dim), w_raw).unwrap();
        let b = ArrayView1::from_shape(self.out_dim, b_raw).unwrap();
        (w, b)
    }

    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> (ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>) {
        let (dw_raw, db_raw) = grad.split_at_mut(self.weight_len());
        let dw = ArrayViewMut2::from_shape((self.in_dim, self.out_dim), dw_raw).unwrap();
        let db = ArrayViewMut1::from_shape(self.out_dim, db_raw).unwrap();
        (dw, db)
    }
}
