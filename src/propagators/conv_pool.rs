use serde_json::Value;
use smallvec::SmallVec;

use crate::architecture::Block;
use crate::config::ConfigError;
use crate::dim::{Dim, conv_output_length, same_output_length};
use crate::propagate::{
    Arity, Propagate, PropagateContext, PropagateError, check_input_count, check_input_shapes,
};
use crate::shape::Shape;

/// Padding mode of a convolution or pooling block, from the `padding`
/// option.
#[derive(Clone, Debug, PartialEq)]
enum Padding {
    /// Pad the input so that each output spatial size is
    /// `ceil(input_size / stride)`.
    Same,

    /// Padding added to both ends of each spatial axis.
    Fixed(SmallVec<[i64; 3]>),
}

/// Window parameters of a convolution or pooling block.
#[derive(Debug)]
struct Window {
    kernel: SmallVec<[i64; 3]>,
    stride: SmallVec<[i64; 3]>,
    dilation: SmallVec<[i64; 3]>,
    padding: Padding,
    channels_last: bool,
}

impl Window {
    /// Read the window options of a block with `spatial_dims` spatial axes.
    ///
    /// `kernel_size`, `stride`, `padding` and `dilation` may be a single
    /// integer applied to every axis or a list with one entry per axis.
    fn from_block(block: &Block, spatial_dims: usize) -> Result<Window, ConfigError> {
        let config = &block.config;
        if !config.contains_key("kernel_size") {
            return Err(ConfigError::missing("kernel_size"));
        }

        let positive = |key: &str, default: i64| -> Result<SmallVec<[i64; 3]>, ConfigError> {
            let vals = config.get_ints(key, spatial_dims, default)?;
            if let Some(val) = vals.iter().find(|v| **v < 1) {
                return Err(ConfigError::invalid_value(
                    key,
                    format!("{} is not >= 1", val),
                ));
            }
            Ok(vals.into())
        };

        let kernel = positive("kernel_size", 1)?;
        let stride = positive("stride", 1)?;
        let dilation = positive("dilation", 1)?;

        let padding = match config.get("padding") {
            Some(Value::String(mode)) if mode == "same" => Padding::Same,
            Some(Value::String(mode)) => {
                return Err(ConfigError::invalid_value(
                    "padding",
                    format!("unsupported padding mode \"{}\"", mode),
                ));
            }
            _ => {
                let pads = config.get_ints("padding", spatial_dims, 0)?;
                if let Some(pad) = pads.iter().find(|p| **p < 0) {
                    return Err(ConfigError::invalid_value(
                        "padding",
                        format!("{} is negative", pad),
                    ));
                }
                Padding::Fixed(pads.into())
            }
        };

        Ok(Window {
            kernel,
            stride,
            dilation,
            padding,
            channels_last: config.get_bool("channels_last", false)?,
        })
    }

    /// Compute the output length of spatial axis `axis`.
    fn output_length(&self, axis: usize, length: &Dim) -> Result<Dim, PropagateError> {
        let stride = self.stride[axis];
        let out = match &self.padding {
            Padding::Same => same_output_length(length, stride)?,
            Padding::Fixed(pads) => conv_output_length(
                length,
                self.kernel[axis],
                stride,
                pads[axis],
                pads[axis],
                self.dilation[axis],
            )?,
        };
        Ok(out)
    }

    /// Compute the output shape, given the size of the output channel
    /// dimension.
    ///
    /// If `channels` is `None`, the input channel count is kept.
    fn output_shape(&self, input: &Shape, channels: Option<Dim>) -> Result<Shape, PropagateError> {
        let dims = input.dims();
        let (channel_axis, spatial) = if self.channels_last {
            (dims.len() - 1, &dims[..dims.len() - 1])
        } else {
            (0, &dims[1..])
        };

        let mut out: SmallVec<[Dim; 4]> = spatial
            .iter()
            .enumerate()
            .map(|(axis, len)| self.output_length(axis, len))
            .collect::<Result<_, _>>()?;
        let channels = channels.unwrap_or_else(|| dims[channel_axis].clone());
        if self.channels_last {
            out.push(channels);
        } else {
            out.insert(0, channels);
        }
        Ok(Shape::from_dims(out))
    }
}

/// Check that a block has a single input with `spatial_dims` spatial axes
/// plus one channel axis.
fn check_window_input(spatial_dims: usize, inputs: &[Shape]) -> Result<(), PropagateError> {
    check_input_count(Arity::Exact(1), inputs)?;
    check_input_shapes(inputs)?;
    let ndim = inputs[0].ndim();
    if ndim != spatial_dims + 1 {
        return Err(PropagateError::rank(spatial_dims + 1, ndim));
    }
    Ok(())
}

/// Convolution blocks (`Conv1d`, `Conv2d`, `Conv3d`).
///
/// The channel dimension of the output is set from the `output_feats`
/// option. Each spatial dimension is computed as
/// `floor((in + 2*padding - dilation*(kernel-1) - 1) / stride) + 1`.
pub struct Conv {
    pub spatial_dims: usize,
}

impl Propagate for Conv {
    fn initial_checks(&self, block: &Block, inputs: &[Shape]) -> Result<(), PropagateError> {
        check_window_input(self.spatial_dims, inputs)?;
        Window::from_block(block, self.spatial_dims)?;
        Ok(())
    }

    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        _ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let window = Window::from_block(block, self.spatial_dims)?;
        let channels = block
            .config
            .get_dim("output_feats")?
            .ok_or_else(|| ConfigError::missing("output_feats"))?;
        if channels.is_auto() || !channels.is_valid() {
            return Err(ConfigError::invalid_value(
                "output_feats",
                format!("{} is not a size >= 1 or a variable", channels),
            )
            .into());
        }
        window.output_shape(&inputs[0], Some(channels))
    }
}

/// Pooling blocks (`MaxPool*`, `AvgPool*`).
///
/// These follow the same rules as [`Conv`], except that the channel
/// dimension passes through unchanged.
pub struct Pool {
    pub spatial_dims: usize,
}

impl Propagate for Pool {
    fn initial_checks(&self, block: &Block, inputs: &[Shape]) -> Result<(), PropagateError> {
        check_window_input(self.spatial_dims, inputs)?;
        Window::from_block(block, self.spatial_dims)?;
        Ok(())
    }

    fn propagate(
        &self,
        block: &Block,
        inputs: &[Shape],
        _ctx: &mut PropagateContext,
    ) -> Result<Shape, PropagateError> {
        let window = Window::from_block(block, self.spatial_dims)?;
        window.output_shape(&inputs[0], None)
    }
}

#[cfg(test)]
mod tests {
    use narchi_testing::TestCases;
    use serde_json::json;

    use super::{Conv, Pool};
    use crate::config::Config;
    use crate::dim::Dim;
    use crate::error::ErrorKind;
    use crate::propagators::run_propagator;
    use crate::shape::{Shape, shape};

    fn config(value: serde_json::Value) -> Config {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_conv() {
        #[derive(Debug)]
        struct Case {
            spatial_dims: usize,
            input: Shape,
            config: serde_json::Value,
            expected: Result<Shape, ErrorKind>,
        }

        let cases = [
            // 2D conv, no padding.
            Case {
                spatial_dims: 2,
                input: shape![3, 32, 32],
                config: json!({"output_feats": 16, "kernel_size": 3}),
                expected: Ok(shape![16, 30, 30]),
            },
            // Padding, stride and dilation per axis.
            Case {
                spatial_dims: 2,
                input: shape![3, 32, 31],
                config: json!({
                    "output_feats": 8,
                    "kernel_size": [3, 5],
                    "stride": [2, 1],
                    "padding": [1, 0],
                    "dilation": [1, 2],
                }),
                expected: Ok(shape![8, 16, 23]),
            },
            // "same" padding
            Case {
                spatial_dims: 1,
                input: shape![4, 101],
                config: json!({"output_feats": 4, "kernel_size": 7, "stride": 2, "padding": "same"}),
                expected: Ok(shape![4, 51]),
            },
            // Channels last
            Case {
                spatial_dims: 1,
                input: shape![10, 3],
                config: json!({"output_feats": 6, "kernel_size": 3, "channels_last": true}),
                expected: Ok(shape![8, 6]),
            },
            // Auto spatial dims stay auto.
            Case {
                spatial_dims: 2,
                input: shape![3, "auto", 28],
                config: json!({"output_feats": 16, "kernel_size": 5}),
                expected: Ok(shape![16, "auto", 24]),
            },
            // Kernel larger than input.
            Case {
                spatial_dims: 1,
                input: shape![3, 4],
                config: json!({"output_feats": 16, "kernel_size": 5}),
                expected: Err(ErrorKind::Dimension),
            },
            Case {
                spatial_dims: 2,
                input: shape![3, 32],
                config: json!({"output_feats": 16, "kernel_size": 3}),
                expected: Err(ErrorKind::Validation),
            },
            Case {
                spatial_dims: 1,
                input: shape![3, 32],
                config: json!({"kernel_size": 3}),
                expected: Err(ErrorKind::Validation),
            },
            Case {
                spatial_dims: 1,
                input: shape![3, 32],
                config: json!({"output_feats": 4}),
                expected: Err(ErrorKind::Validation),
            },
            Case {
                spatial_dims: 1,
                input: shape![3, 32],
                config: json!({"output_feats": 4, "kernel_size": 3, "stride": 0}),
                expected: Err(ErrorKind::Validation),
            },
            Case {
                spatial_dims: 1,
                input: shape![3, 32],
                config: json!({"output_feats": 4, "kernel_size": 3, "padding": "valid"}),
                expected: Err(ErrorKind::Validation),
            },
        ];

        cases.test_each(|case| {
            let conv = Conv {
                spatial_dims: case.spatial_dims,
            };
            let out = run_propagator(&conv, config(case.config.clone()), &[case.input.clone()], &[]);
            assert_eq!(out.map_err(|e| e.kind()), case.expected);
        })
    }

    #[test]
    fn test_conv_symbolic() {
        let conv = Conv { spatial_dims: 2 };
        let cfg = config(json!({"output_feats": 8, "kernel_size": 3, "padding": 1, "stride": 2}));

        let out = run_propagator(&conv, cfg.clone(), &[shape![3, "H", "W"]], &[]).unwrap();
        assert_eq!(out.get_dim(0), Some(&Dim::value(8)));
        assert_eq!(out.get_dim(1), Some(&Dim::parse("<<variable:H/2>>").unwrap()));

        // Bound variables are substituted before propagation, giving concrete
        // sizes.
        let out = run_propagator(&conv, cfg, &[shape![3, 64, 63]], &[]).unwrap();
        assert_eq!(out, shape![8, 32, 32]);
    }

    #[test]
    fn test_pool() {
        // With unit stride and no padding, the output is `in - kernel + 1`.
        let pool = Pool { spatial_dims: 2 };
        let out = run_propagator(
            &pool,
            config(json!({"kernel_size": [2, 3]})),
            &[shape!["C", 10, 12]],
            &[],
        );
        assert_eq!(out, Ok(shape!["C", 9, 10]));

        let out = run_propagator(
            &pool,
            config(json!({"kernel_size": 2, "stride": 2})),
            &[shape!["auto", 10, 12]],
            &[],
        );
        assert_eq!(out, Ok(shape!["auto", 5, 6]));
    }
}
