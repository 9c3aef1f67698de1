//! Error and result types.
//!
//! Runtime call failures carry the numeric status code together with its
//! symbolic name; [`error_string`] renders the stable `"<code> <SYMBOL>"`
//! form for any code, known or not.

use std::fmt;

use failure::{Backtrace, Context, Fail};

/// Crate result type.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Upper bound on a rendered status string, terminator included.
const ERROR_STRING_MAX: usize = 128;

/// Upper bound on a build log attached to a build failure.
pub(crate) const BUILD_LOG_MAX: usize = 64 * 1024;

macro_rules! status_enum {
    ($( $name:ident = $value:expr ),+ $(,)*) => {
        /// An OpenCL status code.
        #[allow(non_camel_case_types)]
        #[repr(i32)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Status {
            $( $name = $value, )+
        }

        impl Status {
            /// Returns the status matching a raw runtime code, if documented.
            pub fn from_i32(code: i32) -> Option<Status> {
                $(
                    if code == $value {
                        return Some(Status::$name);
                    }
                )+
                None
            }
        }
    };
}

status_enum! {
    CL_SUCCESS                                      = 0,
    CL_DEVICE_NOT_FOUND                             = -1,
    CL_DEVICE_NOT_AVAILABLE                         = -2,
    CL_COMPILER_NOT_AVAILABLE                       = -3,
    CL_MEM_OBJECT_ALLOCATION_FAILURE                = -4,
    CL_OUT_OF_RESOURCES                             = -5,
    CL_OUT_OF_HOST_MEMORY                           = -6,
    CL_PROFILING_INFO_NOT_AVAILABLE                 = -7,
    CL_MEM_COPY_OVERLAP                             = -8,
    CL_IMAGE_FORMAT_MISMATCH                        = -9,
    CL_IMAGE_FORMAT_NOT_SUPPORTED                   = -10,
    CL_BUILD_PROGRAM_FAILURE                        = -11,
    CL_MAP_FAILURE                                  = -12,
    CL_MISALIGNED_SUB_BUFFER_OFFSET                 = -13,
    CL_EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST    = -14,
    CL_COMPILE_PROGRAM_FAILURE                      = -15,
    CL_LINKER_NOT_AVAILABLE                         = -16,
    CL_LINK_PROGRAM_FAILURE                         = -17,
    CL_DEVICE_PARTITION_FAILED                      = -18,
    CL_KERNEL_ARG_INFO_NOT_AVAILABLE                = -19,
    CL_INVALID_VALUE                                = -30,
    CL_INVALID_DEVICE_TYPE                          = -31,
    CL_INVALID_PLATFORM                             = -32,
    CL_INVALID_DEVICE                               = -33,
    CL_INVALID_CONTEXT                              = -34,
    CL_INVALID_QUEUE_PROPERTIES                     = -35,
    CL_INVALID_COMMAND_QUEUE                        = -36,
    CL_INVALID_HOST_PTR                             = -37,
    CL_INVALID_MEM_OBJECT                           = -38,
    CL_INVALID_IMAGE_FORMAT_DESCRIPTOR              = -39,
    CL_INVALID_IMAGE_SIZE                           = -40,
    CL_INVALID_SAMPLER                              = -41,
    CL_INVALID_BINARY                               = -42,
    CL_INVALID_BUILD_OPTIONS                        = -43,
    CL_INVALID_PROGRAM                              = -44,
    CL_INVALID_PROGRAM_EXECUTABLE                   = -45,
    CL_INVALID_KERNEL_NAME                          = -46,
    CL_INVALID_KERNEL_DEFINITION                    = -47,
    CL_INVALID_KERNEL                               = -48,
    CL_INVALID_ARG_INDEX                            = -49,
    CL_INVALID_ARG_VALUE                            = -50,
    CL_INVALID_ARG_SIZE                             = -51,
    CL_INVALID_KERNEL_ARGS                          = -52,
    CL_INVALID_WORK_DIMENSION                       = -53,
    CL_INVALID_WORK_GROUP_SIZE                      = -54,
    CL_INVALID_WORK_ITEM_SIZE                       = -55,
    CL_INVALID_GLOBAL_OFFSET                        = -56,
    CL_INVALID_EVENT_WAIT_LIST                      = -57,
    CL_INVALID_EVENT                                = -58,
    CL_INVALID_OPERATION                            = -59,
    CL_INVALID_GL_OBJECT                            = -60,
    CL_INVALID_BUFFER_SIZE                          = -61,
    CL_INVALID_MIP_LEVEL                            = -62,
    CL_INVALID_GLOBAL_WORK_SIZE                     = -63,
    CL_INVALID_PROPERTY                             = -64,
    CL_INVALID_IMAGE_DESCRIPTOR                     = -65,
    CL_INVALID_COMPILER_OPTIONS                     = -66,
    CL_INVALID_LINKER_OPTIONS                       = -67,
    CL_INVALID_DEVICE_PARTITION_COUNT               = -68,
    CL_INVALID_PIPE_SIZE                            = -69,
    CL_INVALID_DEVICE_QUEUE                         = -70,
    CL_PLATFORM_NOT_FOUND_KHR                       = -1001,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Renders `code` as `"<decimal-code> <SYMBOLIC_NAME>"`, or
/// `"<decimal-code> Unknown error"` for codes outside the taxonomy.
///
/// The output is truncated to 128 bytes.
pub fn error_string(code: i32) -> String {
    let mut s = match Status::from_i32(code) {
        Some(status) => format!("{} {}", code, status),
        None => format!("{} Unknown error", code),
    };
    s.truncate(ERROR_STRING_MAX - 1);
    s
}

/// A failed call into the runtime: which entry point, and what it returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    status: Status,
    fn_name: &'static str,
}

impl ApiError {
    pub(crate) fn new(errcode: i32, fn_name: &'static str) -> ApiError {
        let status = Status::from_i32(errcode).unwrap_or(Status::CL_INVALID_VALUE);
        ApiError { status, fn_name }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn fn_name(&self) -> &'static str {
        self.fn_name
    }
}

impl Fail for ApiError {}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.fn_name, error_string(self.status as i32))
    }
}

/// Error variants.
#[derive(Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "{}", _0)]
    Api(ApiError),
    #[fail(display = "unable to load the OpenCL runtime library ({})", _0)]
    Load(String),
    #[fail(display = "symbol missing from the OpenCL runtime library: {}", _0)]
    Symbol(&'static str),
    #[fail(display = "no OpenCL device found")]
    NoDevices,
    #[fail(display = "device index {} out of range (devices: {})", index, count)]
    DeviceIndex { index: usize, count: usize },
    #[fail(display = "program build failed: {}\n{}", status, log)]
    Build { status: Status, log: String },
    #[fail(display = "{}", _0)]
    String(String),
}

/// Crate error type.
pub struct Error {
    inner: Context<ErrorKind>,
}

impl Error {
    /// Returns the error variant and contents.
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }

    /// Returns the runtime status code for `Api` and `Build` variants.
    pub fn api_status(&self) -> Option<Status> {
        match *self.kind() {
            ErrorKind::Api(ref err) => Some(err.status()),
            ErrorKind::Build { status, .. } => Some(status),
            _ => None,
        }
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error { inner: Context::new(kind) }
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Error {
        Error { inner: Context::new(ErrorKind::Api(err)) }
    }
}

impl From<String> for Error {
    fn from(desc: String) -> Error {
        Error { inner: Context::new(ErrorKind::String(desc)) }
    }
}

impl<'a> From<&'a str> for Error {
    fn from(desc: &'a str) -> Error {
        Error { inner: Context::new(ErrorKind::String(String::from(desc))) }
    }
}

/// Evaluates a raw status code, passing `result` through on `CL_SUCCESS`.
#[inline(always)]
pub(crate) fn eval_errcode<T>(errcode: i32, result: T, fn_name: &'static str)
        -> Result<T> {
    if errcode == Status::CL_SUCCESS as i32 {
        Ok(result)
    } else {
        Err(ApiError::new(errcode, fn_name).into())
    }
}
