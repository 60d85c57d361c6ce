/// Node types that ship with ComfyUI itself. Anything outside this set is a
/// custom node and must be traced back to an installable package.
///
/// The list tracks the stock node pack of recent ComfyUI releases; unknown
/// stock nodes degrade gracefully (they show up as unresolvable customs).
pub const BUILTIN_NODE_TYPES: &[&str] = &[
    "BasicScheduler",
    "CLIPLoader",
    "CLIPMergeSimple",
    "CLIPSave",
    "CLIPSetLastLayer",
    "CLIPTextEncode",
    "CLIPTextEncodeSDXL",
    "CLIPTextEncodeSDXLRefiner",
    "CLIPVisionEncode",
    "CLIPVisionLoader",
    "Canny",
    "CheckpointLoader",
    "CheckpointLoaderSimple",
    "CheckpointSave",
    "ConditioningAverage",
    "ConditioningCombine",
    "ConditioningConcat",
    "ConditioningSetArea",
    "ConditioningSetAreaPercentage",
    "ConditioningSetMask",
    "ConditioningSetTimestepRange",
    "ConditioningZeroOut",
    "ControlNetApply",
    "ControlNetApplyAdvanced",
    "ControlNetLoader",
    "CropMask",
    "DiffControlNetLoader",
    "DiffusersLoader",
    "DualCLIPLoader",
    "EmptyImage",
    "EmptyLatentImage",
    "EmptySD3LatentImage",
    "FeatherMask",
    "FluxGuidance",
    "FreeU",
    "FreeU_V2",
    "GLIGENLoader",
    "GLIGENTextBoxApply",
    "GrowMask",
    "HypernetworkLoader",
    "ImageBatch",
    "ImageBlend",
    "ImageBlur",
    "ImageColorToMask",
    "ImageCompositeMasked",
    "ImageCrop",
    "ImageFlip",
    "ImageInvert",
    "ImagePadForOutpaint",
    "ImageQuantize",
    "ImageRotate",
    "ImageScale",
    "ImageScaleBy",
    "ImageScaleToTotalPixels",
    "ImageSharpen",
    "ImageToMask",
    "ImageUpscaleWithModel",
    "InpaintModelConditioning",
    "InvertMask",
    "JoinImageWithAlpha",
    "KSampler",
    "KSamplerAdvanced",
    "KSamplerSelect",
    "LatentAdd",
    "LatentBatch",
    "LatentBlend",
    "LatentComposite",
    "LatentCompositeMasked",
    "LatentCrop",
    "LatentFlip",
    "LatentFromBatch",
    "LatentInterpolate",
    "LatentMultiply",
    "LatentRotate",
    "LatentSubtract",
    "LatentUpscale",
    "LatentUpscaleBy",
    "LoadImage",
    "LoadImageMask",
    "LoadLatent",
    "LoraLoader",
    "LoraLoaderModelOnly",
    "MaskComposite",
    "MaskToImage",
    "ModelMergeAdd",
    "ModelMergeBlocks",
    "ModelMergeSimple",
    "ModelMergeSubtract",
    "ModelSamplingContinuousEDM",
    "ModelSamplingDiscrete",
    "ModelSamplingFlux",
    "ModelSamplingSD3",
    "PatchModelAddDownscale",
    "PerpNeg",
    "PhotoMakerEncode",
    "PhotoMakerLoader",
    "PolyexponentialScheduler",
    "PorterDuffImageComposite",
    "PreviewImage",
    "RebatchImages",
    "RebatchLatents",
    "RepeatImageBatch",
    "RepeatLatentBatch",
    "RescaleCFG",
    "SDTurboScheduler",
    "SD_4XUpscale_Conditioning",
    "SamplerCustom",
    "SamplerCustomAdvanced",
    "SamplerDPMPP_2M_SDE",
    "SamplerDPMPP_SDE",
    "SaveAnimatedPNG",
    "SaveAnimatedWEBP",
    "SaveImage",
    "SaveLatent",
    "SelfAttentionGuidance",
    "SetLatentNoiseMask",
    "SolidMask",
    "SplitImageWithAlpha",
    "SplitSigmas",
    "StableZero123_Conditioning",
    "StyleModelApply",
    "StyleModelLoader",
    "TomePatchModel",
    "UNETLoader",
    "UpscaleModelLoader",
    "VAEDecode",
    "VAEDecodeTiled",
    "VAEEncode",
    "VAEEncodeForInpaint",
    "VAEEncodeTiled",
    "VAELoader",
    "VAESave",
    "VPScheduler",
    "VideoLinearCFGGuidance",
    "unCLIPCheckpointLoader",
    "unCLIPConditioning",
];
